//! Useful macros.

/// Join the given path components with `/`, e.g. `dir!(results, "summary.txt")`.
#[macro_export]
macro_rules! dir {
    ($first:expr $(, $part:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut path = String::from($first);
        $(
            if !path.ends_with('/') {
                path.push('/');
            }
            path.push_str(&$part);
        )*
        path
    }};
}

/// Time the given expression and push `(label, duration)` onto `timers`. Evaluates to the value
/// of the expression.
///
/// ```rust,ignore
/// let mut timers = vec![];
/// let out = time!(timers, "Sample", shell.run("cat /proc/meminfo")?);
/// ```
#[macro_export]
macro_rules! time {
    ($timers:ident, $label:expr, $expr:expr) => {{
        let start = std::time::Instant::now();
        let result = $expr;
        let duration = std::time::Instant::now() - start;
        $timers.push(($label, duration));
        result
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn dir_joins_components() {
        let base = String::from("results");
        assert_eq!(dir!(base.as_str(), "summary.txt"), "results/summary.txt");
        assert_eq!(dir!("/tmp/", "a", String::from("b")), "/tmp/a/b");
        assert_eq!(dir!("single"), "single");
    }

    #[test]
    fn time_records_label() {
        let mut timers = vec![];
        let x = time!(timers, "add", 1 + 1);
        assert_eq!(x, 2);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].0, "add");
    }
}
