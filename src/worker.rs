use crate::batch::{BatchConfig, BatchOrchestrator, BatchReport, Upload};
use crate::progress::ProgressSink;
use crate::viewer::CadBackend;
use std::sync::mpsc::{self, Receiver, Sender};

/// Message sent from the batch worker to the UI thread
pub enum BatchMessage {
    /// Overall completion in `0.0..=1.0`
    Progress(f64),
    /// The archive is written
    Finished(BatchReport),
    /// The batch stopped on an error
    Failed(String),
}

struct ChannelProgress<'a> {
    tx: &'a Sender<BatchMessage>,
}

impl ProgressSink for ChannelProgress<'_> {
    fn report(&mut self, fraction: f64) {
        // The UI may have gone away; the batch still runs to completion.
        if self.tx.send(BatchMessage::Progress(fraction)).is_err() {
            log::debug!("Progress {fraction:.3} dropped, receiver closed");
        }
    }
}

/// Run a batch on a background thread, streaming progress and the outcome
/// through the returned channel.
pub fn spawn_batch<B>(backend: B, config: BatchConfig, uploads: Vec<Upload>) -> Receiver<BatchMessage>
where
    B: CadBackend + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let orchestrator = BatchOrchestrator::new(backend, config);
        let mut progress = ChannelProgress { tx: &tx };
        let message = match orchestrator.run(&uploads, Some(&mut progress)) {
            Ok(report) => BatchMessage::Finished(report),
            Err(e) => {
                log::error!("Batch failed: {e}");
                BatchMessage::Failed(e.to_string())
            }
        };
        if tx.send(message).is_err() {
            log::debug!("Batch result dropped, receiver closed");
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, Resolution};

    #[test]
    fn failure_is_delivered_after_progress() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            resolution: Resolution::default(),
            view_step: 90,
            archive_path: dir.path().join("rendered_results.zip"),
            on_failure: FailurePolicy::Abort,
        };
        let uploads = vec![Upload::new("broken.step", b"not a step file".to_vec())];

        let rx = spawn_batch(crate::SoftwareBackend::default(), config, uploads);
        let messages: Vec<_> = rx.iter().collect();

        assert!(matches!(messages.first(), Some(BatchMessage::Progress(p)) if *p == 0.0));
        match messages.last() {
            Some(BatchMessage::Failed(msg)) => assert!(msg.contains("broken.step")),
            _ => panic!("expected a failure message"),
        }
        assert!(!dir.path().join("rendered_results.zip").exists());
    }

    #[test]
    fn closed_receiver_does_not_stop_reporting() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut progress = ChannelProgress { tx: &tx };
        progress.report(0.5);
        progress.report(1.0);
    }
}
