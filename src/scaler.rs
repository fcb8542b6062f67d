//! Auto-Scaler: a background task that grows or shrinks the pool toward the
//! configured utilization band, one action per tick (§4.6).

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
        let mut interval = tokio::time::interval(strong.config().scaler_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        drop(strong);

        loop {
            interval.tick().await;
            let Some(strong) = pool.upgrade() else {
                return;
            };
            strong.run_scaler_tick().await;
        }
    })
}
