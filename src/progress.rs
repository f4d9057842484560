/// One progress observation, reported at chunk boundaries.
///
/// Totals may be zero when unknown (e.g. while the scanner is still sizing
/// the input set).
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub file_bytes_done: u64,
    pub file_bytes_total: u64,
    pub file_name: &'a str,
}

/// Progress sink for archive operations.
///
/// Returning `false` requests cancellation; the pipeline unwinds with
/// `Canceled` at the next chunk boundary.
pub trait Progress {
    fn report(&mut self, update: &ProgressUpdate<'_>) -> bool;
}

/// The silent sink.
impl Progress for () {
    fn report(&mut self, _update: &ProgressUpdate<'_>) -> bool {
        true
    }
}

/// Adapter turning any `FnMut(&ProgressUpdate) -> bool` closure into a
/// [`Progress`] sink.
pub struct ProgressFn<F>(pub F);

impl<F> Progress for ProgressFn<F>
where
    F: FnMut(&ProgressUpdate<'_>) -> bool,
{
    fn report(&mut self, update: &ProgressUpdate<'_>) -> bool {
        (self.0)(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_sink_never_cancels() {
        let mut sink = ();
        let update = ProgressUpdate {
            bytes_done: 1,
            bytes_total: 2,
            file_bytes_done: 1,
            file_bytes_total: 2,
            file_name: "a.txt",
        };
        assert!(sink.report(&update));
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        let mut sink = ProgressFn(|u: &ProgressUpdate<'_>| {
            seen.push(u.bytes_done);
            u.bytes_done < 10
        });
        let mut update = ProgressUpdate {
            bytes_done: 5,
            bytes_total: 20,
            file_bytes_done: 5,
            file_bytes_total: 20,
            file_name: "f",
        };
        assert!(sink.report(&update));
        update.bytes_done = 15;
        assert!(!sink.report(&update));
        drop(sink);
        assert_eq!(seen, vec![5, 15]);
    }
}
