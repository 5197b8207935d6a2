// Per-subscriber merge and throttle loop between the hub and one client.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::types::Progress;

/// Pump samples from a hub subscription into `out`, at most one frame per
/// throttle interval.
///
/// Two producers feed a subscription: chunk workers push bytes-only
/// samples (`speed == -1`) at high frequency and the speed sampler pushes
/// full samples (`speed > 0`) every sampling period. The merge keeps the
/// most recent measured speed while tracking the counters on every sample.
///
/// Returns when the task is observed complete (counters reach the total),
/// when the subscription closes (a trailing unsent frame is flushed
/// first), or when the client side of `out` goes away.
pub async fn relay(
    mut samples: mpsc::Receiver<Progress>,
    throttle: Duration,
    out: mpsc::Sender<Progress>,
) {
    let mut last = Progress::default();
    let mut pending = false;

    let mut ticker = tokio::time::interval(throttle);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; swallow it so the first frame
    // waits out a full interval
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = out.closed() => return,
            sample = samples.recv() => match sample {
                None => {
                    if pending {
                        let _ = out.send(last).await;
                    }
                    return;
                }
                Some(s) => {
                    if s.speed > 0 {
                        // sampler frame: counters and speed are both fresh
                        last = s;
                    } else {
                        // worker frame: counters only, keep the known speed
                        last.downloaded = s.downloaded;
                        last.total = s.total;
                    }
                    pending = true;
                    if last.is_complete() {
                        let _ = out.send(last).await;
                        return;
                    }
                }
            },
            _ = ticker.tick() => {
                if pending {
                    if out.send(last).await.is_err() {
                        return;
                    }
                    pending = false;
                }
            }
        }
    }
}
