//! Health Monitor: a background task that probes every connection on a
//! fixed interval and folds the result into per-connection health state
//! (§4.5).
//!
//! Holds only a `Weak` reference to the pool so the task exits once the
//! last `Pool` handle drops, driven by a `tokio::time::interval`.

use std::sync::Weak;

use tokio::task::JoinHandle;

use crate::pool::SharedPool;
use crate::probe::ProbeProvider;

pub(crate) fn spawn<P>(pool: Weak<SharedPool<P>>) -> JoinHandle<()>
where
    P: ProbeProvider,
{
    tokio::spawn(async move {
        let Some(strong) = pool.upgrade() else { return };
        let mut interval = tokio::time::interval(strong.config().health_check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        drop(strong);

        loop {
            interval.tick().await;
            let Some(strong) = pool.upgrade() else {
                return;
            };
            strong.run_health_tick().await;
        }
    })
}
