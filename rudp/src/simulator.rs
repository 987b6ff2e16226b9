//! Network simulator for exercising the protocol under impairment.
//!
//! Real networks drop, reorder, duplicate and delay datagrams.  To exercise
//! the reliability mechanisms without depending on actual network conditions,
//! this module provides:
//!
//! - [`Pipeline`]: a batch transform `Vec<frame> → Vec<frame>` built from
//!   [`Stage`]s, driven by a seeded RNG so a given seed always makes the same
//!   decisions for the same input;
//! - [`link`]: an in-memory duplex channel whose forwarder task collects the
//!   frames sent in each direction every tick, runs them through that
//!   direction's pipeline, and delivers the result.  Each end is a
//!   [`Transport`], so the engines cannot tell it from a socket.
//!
//! | Stage       | Effect on a batch                                        |
//! |-------------|----------------------------------------------------------|
//! | `Drop`      | Remove each frame with probability `probability`.        |
//! | `Duplicate` | With probability `probability`, emit `copies` copies.    |
//! | `Shuffle`   | Permute the batch.                                       |
//! | `Corrupt`   | Flip one bit of each frame with probability `probability`.|
//! | `Hold`      | Keep each frame back until the next batch (delay).       |

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One impairment step.  Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Drop { probability: f64 },
    Duplicate { probability: f64, copies: usize },
    Shuffle,
    Corrupt { probability: f64 },
    Hold { probability: f64 },
}

/// Ordered impairment stages applied to each batch.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    rng: StdRng,
    /// Frames kept back by a `Hold` stage, released with the next batch.
    held: Vec<Vec<u8>>,
}

impl Pipeline {
    /// An empty (pass-through) pipeline.
    pub fn new(seed: u64) -> Self {
        Self {
            stages: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            held: Vec::new(),
        }
    }

    /// Pass-through pipeline.
    pub fn clean() -> Self {
        Self::new(0)
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Each frame independently survives with probability `1 − drop`.
    pub fn random_drop(seed: u64, drop: f64) -> Self {
        Self::new(seed).with_stage(Stage::Drop { probability: drop })
    }

    /// Half of the frames are delivered three times.
    pub fn random_duplication(seed: u64) -> Self {
        Self::new(seed).with_stage(Stage::Duplicate {
            probability: 0.5,
            copies: 3,
        })
    }

    /// Every frame three times, in random order.
    pub fn duplicate_and_shuffle(seed: u64) -> Self {
        Self::new(seed)
            .with_stage(Stage::Duplicate {
                probability: 1.0,
                copies: 3,
            })
            .with_stage(Stage::Shuffle)
    }

    /// Half of the frames arrive one batch late.
    pub fn random_delay(seed: u64) -> Self {
        Self::new(seed).with_stage(Stage::Hold { probability: 0.5 })
    }

    /// Frames currently held back for the next batch.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Run `batch` through every stage in order.
    pub fn transform(&mut self, mut batch: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        for stage in &self.stages {
            batch = match *stage {
                Stage::Drop { probability } => batch
                    .into_iter()
                    .filter(|_| !self.rng.random_bool(probability))
                    .collect(),
                Stage::Duplicate {
                    probability,
                    copies,
                } => {
                    let mut out = Vec::with_capacity(batch.len());
                    for frame in batch {
                        let n = if self.rng.random_bool(probability) { copies } else { 1 };
                        out.extend(std::iter::repeat(frame).take(n));
                    }
                    out
                }
                Stage::Shuffle => {
                    batch.shuffle(&mut self.rng);
                    batch
                }
                Stage::Corrupt { probability } => {
                    for frame in batch.iter_mut().filter(|f| !f.is_empty()) {
                        if self.rng.random_bool(probability) {
                            let at = self.rng.random_range(0..frame.len());
                            let bit: u32 = self.rng.random_range(0..8);
                            frame[at] ^= 1 << bit;
                        }
                    }
                    batch
                }
                Stage::Hold { probability } => {
                    let mut out = std::mem::take(&mut self.held);
                    for frame in batch {
                        if self.rng.random_bool(probability) {
                            self.held.push(frame);
                        } else {
                            out.push(frame);
                        }
                    }
                    out
                }
            };
        }
        batch
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// One end of an in-memory link.
#[derive(Debug)]
pub struct LinkEnd {
    outbound: UnboundedSender<Vec<u8>>,
    inbound: UnboundedReceiver<Vec<u8>>,
}

impl Transport for LinkEnd {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.outbound
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match timeout(wait, self.inbound.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(TransportError::Closed),
        }
    }
}

/// Build a duplex link.
///
/// `forward` impairs frames from the first end to the second, `backward` the
/// reverse direction.  The returned task runs until both ends are dropped.
pub fn link(
    forward: Pipeline,
    backward: Pipeline,
    tick: Duration,
) -> (LinkEnd, LinkEnd, JoinHandle<()>) {
    let (a_out_tx, a_out_rx) = mpsc::unbounded_channel();
    let (b_out_tx, b_out_rx) = mpsc::unbounded_channel();
    let (a_in_tx, a_in_rx) = mpsc::unbounded_channel();
    let (b_in_tx, b_in_rx) = mpsc::unbounded_channel();

    let a = LinkEnd {
        outbound: a_out_tx,
        inbound: a_in_rx,
    };
    let b = LinkEnd {
        outbound: b_out_tx,
        inbound: b_in_rx,
    };
    let forwarder = tokio::spawn(forward_loop(
        [
            Direction {
                from: a_out_rx,
                to: b_in_tx,
                pipeline: forward,
                open: true,
            },
            Direction {
                from: b_out_rx,
                to: a_in_tx,
                pipeline: backward,
                open: true,
            },
        ],
        tick,
    ));
    (a, b, forwarder)
}

struct Direction {
    from: UnboundedReceiver<Vec<u8>>,
    to: UnboundedSender<Vec<u8>>,
    pipeline: Pipeline,
    open: bool,
}

async fn forward_loop(mut directions: [Direction; 2], tick: Duration) {
    let mut ticker = tokio::time::interval(tick);
    while directions.iter().any(|d| d.open) {
        ticker.tick().await;
        for dir in directions.iter_mut() {
            let mut batch = Vec::new();
            loop {
                match dir.from.try_recv() {
                    Ok(frame) => batch.push(frame),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        dir.open = false;
                        break;
                    }
                }
            }
            if batch.is_empty() && dir.pipeline.held() == 0 {
                continue;
            }
            let sent = batch.len();
            let out = dir.pipeline.transform(batch);
            log::trace!("[link] batch in={sent} out={}", out.len());
            for frame in out {
                // A departed receiver behaves like a black hole.
                let _ = dir.to.send(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(1);

    fn frames(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i; 4]).collect()
    }

    #[test]
    fn clean_pipeline_is_identity() {
        let mut p = Pipeline::clean();
        assert_eq!(p.transform(frames(5)), frames(5));
    }

    #[test]
    fn certain_drop_removes_everything() {
        let mut p = Pipeline::random_drop(1, 1.0);
        assert!(p.transform(frames(10)).is_empty());
    }

    #[test]
    fn drop_rate_is_roughly_honoured() {
        let mut p = Pipeline::random_drop(7, 0.5);
        let kept = p.transform((0..2000u32).map(|i| i.to_be_bytes().to_vec()).collect());
        assert!((800..1200).contains(&kept.len()), "kept {}", kept.len());
    }

    #[test]
    fn same_seed_same_decisions() {
        let mut a = Pipeline::random_drop(42, 0.5);
        let mut b = Pipeline::random_drop(42, 0.5);
        assert_eq!(a.transform(frames(50)), b.transform(frames(50)));
    }

    #[test]
    fn duplicate_and_shuffle_triples_batch() {
        let mut p = Pipeline::duplicate_and_shuffle(3);
        let mut out = p.transform(frames(4));
        assert_eq!(out.len(), 12);
        out.sort();
        let mut expected: Vec<Vec<u8>> = frames(4)
            .into_iter()
            .flat_map(|f| [f.clone(), f.clone(), f])
            .collect();
        expected.sort();
        assert_eq!(out, expected);
    }

    #[test]
    fn corrupt_changes_exactly_one_bit() {
        let mut p = Pipeline::new(9).with_stage(Stage::Corrupt { probability: 1.0 });
        let original = vec![0u8; 16];
        let out = p.transform(vec![original.clone()]);
        let flipped: u32 = out[0]
            .iter()
            .zip(&original)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(flipped, 1);
    }

    #[test]
    fn hold_releases_on_next_batch() {
        let mut p = Pipeline::new(5).with_stage(Stage::Hold { probability: 1.0 });
        assert!(p.transform(frames(3)).is_empty());
        assert_eq!(p.held(), 3);
        // Everything new is held again; the old batch comes out.
        assert_eq!(p.transform(vec![vec![9]]), frames(3));
        assert_eq!(p.held(), 1);
    }

    #[tokio::test]
    async fn link_delivers_both_ways() {
        let (mut a, mut b, _task) = link(Pipeline::clean(), Pipeline::clean(), TICK);
        a.send(b"ping").await.unwrap();
        assert_eq!(b.recv(Duration::from_secs(1)).await.unwrap(), Some(b"ping".to_vec()));
        b.send(b"pong").await.unwrap();
        assert_eq!(a.recv(Duration::from_secs(1)).await.unwrap(), Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn silent_link_times_out_quietly() {
        let (mut a, _b, _task) = link(Pipeline::clean(), Pipeline::clean(), TICK);
        assert_eq!(a.recv(Duration::from_millis(20)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn forwarder_stops_when_both_ends_drop() {
        let (a, b, task) = link(Pipeline::clean(), Pipeline::clean(), TICK);
        drop(a);
        drop(b);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder did not stop")
            .unwrap();
    }
}
