// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Frame synchronizer thread.
//!
//! One dedicated thread per synchronizer blocks on all input subscriptions
//! plus a stop channel, bounded by the open window's deadline, and feeds a
//! [`WindowAligner`]. Only that thread touches the aligner.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Select, Sender};

use crate::config::SynchronizerConfig;
use crate::error::{LinkError, LinkResult};
use crate::stats::SyncStats;
use crate::sync::bus::{LocalBus, Subscription, TopicPublisher};
use crate::sync::window::{FrameSet, WindowAligner};

/// Aligns frames from several input topics into [`FrameSet`]s published on
/// an output topic.
pub struct FrameSynchronizer<F> {
    config: SynchronizerConfig,
    inputs: Arc<LocalBus<F>>,
    outputs: Arc<LocalBus<FrameSet<F>>>,
}

impl<F: Clone + Send + 'static> FrameSynchronizer<F> {
    pub fn new(
        config: SynchronizerConfig,
        inputs: Arc<LocalBus<F>>,
        outputs: Arc<LocalBus<FrameSet<F>>>,
    ) -> Self {
        Self {
            config,
            inputs,
            outputs,
        }
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    /// Subscribe to the input topics and start the synchronizer thread.
    ///
    /// Frames published before this call are not seen.
    pub fn start(self) -> LinkResult<SyncHandle> {
        let subscriptions: Vec<Subscription<F>> = self
            .config
            .input_topics
            .iter()
            .map(|topic| self.inputs.subscribe(topic))
            .collect();
        let output = self.outputs.publisher(&self.config.output_topic);
        let aligner = WindowAligner::new(self.config.strategy, self.config.permutation.clone());

        let (stop_tx, stop_rx) = bounded(1);
        let stats = Arc::new(Mutex::new(SyncStats::default()));
        let name = self.config.name.clone();

        let worker = SyncWorker {
            name: name.clone(),
            aligner,
            subscriptions,
            output,
            stop: stop_rx,
            stats: Arc::clone(&stats),
        };

        let thread = thread::Builder::new()
            .name(format!("framesync-{}", name))
            .spawn(move || worker.run())
            .map_err(|e| LinkError::Io {
                context: "spawning synchronizer thread",
                source: e,
            })?;

        tracing::info!(
            synchronizer = %name,
            channels = self.config.channel_count(),
            mode = self.config.strategy.mode(),
            output = %self.config.output_topic,
            "Frame synchronizer started"
        );

        Ok(SyncHandle {
            name,
            stop: Some(stop_tx),
            thread: Some(thread),
            stats,
        })
    }
}

/// Running synchronizer. Dropping the handle stops the thread.
pub struct SyncHandle {
    name: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<SyncStats>>,
    stats: Arc<Mutex<SyncStats>>,
}

impl SyncHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters as of the last event the thread processed.
    pub fn stats(&self) -> SyncStats {
        match self.stats.lock() {
            Ok(stats) => *stats,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Whether the synchronizer thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread, discarding any open window, and return final counters.
    pub fn stop(mut self) -> LinkResult<SyncStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> LinkResult<SyncStats> {
        if let Some(stop) = self.stop.take() {
            // The thread may already have exited; a failed send is fine.
            let _ = stop.send(());
        }
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| LinkError::SynchronizerPanicked {
                name: self.name.clone(),
            }),
            None => Ok(self.stats()),
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::error!(synchronizer = %self.name, error = %e, "Synchronizer stop failed");
            }
        }
    }
}

struct SyncWorker<F> {
    name: String,
    aligner: WindowAligner<F>,
    subscriptions: Vec<Subscription<F>>,
    output: TopicPublisher<FrameSet<F>>,
    stop: Receiver<()>,
    stats: Arc<Mutex<SyncStats>>,
}

impl<F: Clone + Send + 'static> SyncWorker<F> {
    fn run(self) -> SyncStats {
        let SyncWorker {
            name,
            mut aligner,
            subscriptions,
            output,
            stop,
            stats,
        } = self;
        let mut live = vec![true; subscriptions.len()];

        loop {
            let mut select = Select::new();
            let stop_index = select.recv(&stop);
            let mut channel_of = Vec::with_capacity(subscriptions.len());
            for (channel, subscription) in subscriptions.iter().enumerate() {
                if live[channel] {
                    let index = select.recv(subscription.receiver());
                    channel_of.push((index, channel));
                }
            }

            if channel_of.is_empty() {
                tracing::debug!(synchronizer = %name, "All inputs closed");
                break;
            }

            let selected = match aligner.next_deadline() {
                Some(deadline) => select.select_deadline(deadline),
                None => Ok(select.select()),
            };

            match selected {
                Err(_) => {
                    if let Some(set) = aligner.on_tick(Instant::now()) {
                        emit(&name, &mut aligner, &output, set);
                    }
                }
                Ok(operation) if operation.index() == stop_index => {
                    let _ = operation.recv(&stop);
                    break;
                }
                Ok(operation) => {
                    let index = operation.index();
                    let channel = channel_of
                        .iter()
                        .find(|(i, _)| *i == index)
                        .map(|&(_, channel)| channel)
                        .unwrap_or_default();
                    match operation.recv(subscriptions[channel].receiver()) {
                        Ok(frame) => {
                            for set in aligner.on_frame(channel, frame, Instant::now()) {
                                emit(&name, &mut aligner, &output, set);
                            }
                        }
                        Err(_) => {
                            live[channel] = false;
                            tracing::debug!(
                                synchronizer = %name,
                                topic = %subscriptions[channel].topic(),
                                "Input closed"
                            );
                        }
                    }
                }
            }
            publish_stats(&stats, &aligner);
        }

        aligner.shutdown();
        publish_stats(&stats, &aligner);
        tracing::info!(synchronizer = %name, "Frame synchronizer stopped");
        aligner.stats()
    }
}

fn emit<F: Clone + Send + 'static>(
    name: &str,
    aligner: &mut WindowAligner<F>,
    output: &TopicPublisher<FrameSet<F>>,
    set: FrameSet<F>,
) {
    let sequence = set.sequence;
    let present = set.present();
    if output.publish(set) == 0 {
        aligner.record_undelivered();
        tracing::debug!(synchronizer = %name, sequence = sequence, "Frame set had no subscribers");
    } else {
        tracing::trace!(
            synchronizer = %name,
            sequence = sequence,
            present = present,
            "Frame set published"
        );
    }
}

fn publish_stats<F>(shared: &Mutex<SyncStats>, aligner: &WindowAligner<F>) {
    let stats = aligner.stats();
    match shared.lock() {
        Ok(mut guard) => *guard = stats,
        Err(poisoned) => *poisoned.into_inner() = stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::window::AlignmentStrategy;
    use crate::types::Permutation;
    use std::time::Duration;

    fn config(span: Duration, permutation: Vec<u32>) -> SynchronizerConfig {
        SynchronizerConfig::new(
            "test",
            AlignmentStrategy::window(span),
            vec!["/in/a".into(), "/in/b".into(), "/in/c".into()],
            Some(permutation),
            "/out",
        )
        .unwrap()
    }

    struct Harness {
        inputs: Arc<LocalBus<u32>>,
        output: Subscription<FrameSet<u32>>,
        handle: SyncHandle,
    }

    fn start(span: Duration, permutation: Vec<u32>) -> Harness {
        let inputs = Arc::new(LocalBus::new());
        let outputs = Arc::new(LocalBus::new());
        let output = outputs.subscribe("/out");
        let handle = FrameSynchronizer::new(
            config(span, permutation),
            Arc::clone(&inputs),
            outputs,
        )
        .start()
        .unwrap();
        Harness {
            inputs,
            output,
            handle,
        }
    }

    #[test]
    fn test_full_arrival_emits_before_deadline() {
        let h = start(Duration::from_millis(500), vec![2, 0, 1]);
        let start = Instant::now();

        h.inputs.publish("/in/a", 1);
        h.inputs.publish("/in/b", 2);
        h.inputs.publish("/in/c", 3);

        let set = h.output.try_receive(Duration::from_secs(2)).expect("frame set");
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(set.sequence, 0);
        assert_eq!(set.slots, vec![Some(2), Some(3), Some(1)]);

        let stats = h.handle.stop().unwrap();
        assert_eq!(stats.windows_complete, 1);
        assert_eq!(stats.frames_received, 3);
    }

    #[test]
    fn test_partial_window_emits_at_deadline() {
        let h = start(Duration::from_millis(50), vec![2, 0, 1]);
        let start = Instant::now();

        h.inputs.publish("/in/a", 10);
        h.inputs.publish("/in/b", 20);

        let set = h.output.try_receive(Duration::from_secs(2)).expect("frame set");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(set.slots, vec![Some(20), None, Some(10)]);

        h.inputs.publish("/in/c", 30);
        let next = h.output.try_receive(Duration::from_secs(2)).expect("second set");
        assert_eq!(next.sequence, 1);
        assert_eq!(next.slots, vec![None, Some(30), None]);

        let stats = h.handle.stop().unwrap();
        assert_eq!(stats.windows_partial, 2);
    }

    #[test]
    fn test_stop_discards_open_window() {
        let h = start(Duration::from_secs(10), vec![0, 1, 2]);
        h.inputs.publish("/in/a", 1);

        // Wait until the thread has taken the frame.
        let deadline = Instant::now() + Duration::from_secs(2);
        while h.handle.stats().frames_received == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(h.handle.is_running());
        let stats = h.handle.stop().unwrap();
        assert_eq!(stats.windows_discarded, 1);
        assert_eq!(stats.windows_emitted(), 0);
        assert!(h.output.try_receive(Duration::ZERO).is_none());
    }

    #[test]
    fn test_thread_exits_when_inputs_close() {
        let h = start(Duration::from_millis(50), vec![0, 1, 2]);
        let Harness { inputs, handle, .. } = h;
        drop(inputs);

        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.is_running());
        assert_eq!(handle.stop().unwrap(), SyncStats::default());
    }

    #[test]
    fn test_identity_permutation_default() {
        let cfg = SynchronizerConfig::new(
            "identity",
            AlignmentStrategy::window(Duration::from_millis(10)),
            vec!["/a".into(), "/b".into()],
            None,
            "/out",
        )
        .unwrap();
        assert_eq!(cfg.permutation, Permutation::identity(2));
    }
}
