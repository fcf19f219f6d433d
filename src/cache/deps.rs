//! Asset dependency collector.
//!
//! Uses `tokio::task_local!` so handlers can record the files they read
//! without threading a collector through every call. The HTTP layer wraps
//! each render in [`collect`] and links whatever was recorded to the
//! resource hash.

use std::cell::RefCell;
use std::collections::BTreeSet;

use super::keys::AssetFile;

tokio::task_local! {
    static DEPS: RefCell<BTreeSet<AssetFile>>;
}

/// Record that the current render read `file`.
///
/// Outside a collector the call is silently ignored.
pub fn record(file: AssetFile) {
    let _ = DEPS.try_with(|deps| {
        deps.borrow_mut().insert(file);
    });
}

/// Run `f` with a fresh collector and return its result with the recorded files.
pub fn collect<F, R>(f: F) -> (R, Vec<AssetFile>)
where
    F: FnOnce() -> R,
{
    DEPS.sync_scope(RefCell::new(BTreeSet::new()), || {
        let result = f();
        let files = DEPS.with(|deps| deps.take());
        (result, files.into_iter().collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_without_collector_is_a_no_op() {
        record(AssetFile::from("orphan.css"));
    }

    #[test]
    fn collect_captures_and_deduplicates() {
        let (value, files) = collect(|| {
            record(AssetFile::from("b.css"));
            record(AssetFile::from("a.css"));
            record(AssetFile::from("b.css"));
            42
        });

        assert_eq!(value, 42);
        assert_eq!(files, vec![AssetFile::from("a.css"), AssetFile::from("b.css")]);
    }

    #[test]
    fn nested_collectors_are_independent() {
        let (inner, outer) = collect(|| {
            record(AssetFile::from("outer.css"));
            let (_, inner) = collect(|| record(AssetFile::from("inner.css")));
            inner
        });

        assert_eq!(inner, vec![AssetFile::from("inner.css")]);
        assert_eq!(outer, vec![AssetFile::from("outer.css")]);
    }
}
