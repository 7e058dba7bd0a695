//! Progress reporting.
//!
//! The normalizer announces each pass and stage through a caller-supplied
//! [`ProgressSink`]. Messages are purely observational; every message is
//! also emitted at `debug` level through the `log` facade.

/// Receiver for human-readable status messages, in emission order.
pub trait ProgressSink {
    /// Accept one status message.
    fn report(&mut self, message: &str);
}

/// Collects every message.
impl ProgressSink for Vec<String> {
    fn report(&mut self, message: &str) {
        self.push(message.to_owned());
    }
}

/// Discards every message.
impl ProgressSink for () {
    fn report(&mut self, _message: &str) {}
}

/// Adapts a closure into a [`ProgressSink`].
///
/// ```
/// use gridsnap_pipeline::progress::{ProgressFn, ProgressSink};
///
/// let mut count = 0;
/// let mut sink = ProgressFn(|_: &str| count += 1);
/// sink.report("pass 1");
/// drop(sink);
/// assert_eq!(count, 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ProgressFn<F>(pub F);

impl<F: FnMut(&str)> ProgressSink for ProgressFn<F> {
    fn report(&mut self, message: &str) {
        (self.0)(message);
    }
}

/// Send `message` to `sink` and the debug log.
pub(crate) fn emit(sink: &mut dyn ProgressSink, message: &str) {
    log::debug!("progress: {message}");
    sink.report(message);
}
