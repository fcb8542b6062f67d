//! Janitor: a background task that reaps aged-out, idle-expired, or
//! inactive connections on a fixed interval (§4.7). Never touches a busy
//! connection — it drops out on release and is re-examined next tick.

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
        let mut interval = tokio::time::interval(strong.config().janitor_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        drop(strong);

        loop {
            interval.tick().await;
            let Some(strong) = pool.upgrade() else {
                return;
            };
            strong.run_janitor_tick().await;
        }
    })
}
