use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::events;
use super::socket::SocketHandle;

/// What a timer tick turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// A heartbeat went out and now awaits its ack.
    Sent,
    /// The previous heartbeat was never acked. The timer has been cancelled.
    Missed,
    /// The tick came from a timer that has since been cancelled or replaced.
    Stale,
}

/// Keeps one heartbeat timer per session alive and tracks acks.
///
/// The timer task only reports ticks; the heartbeat itself is sent from
/// `on_tick`, which the owner calls from its event loop. Each armed timer
/// carries a generation, and ticks from an older generation are ignored, so
/// a tick already queued when the timer is cancelled changes nothing.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Option<Duration>,
    last_acked: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl HeartbeatManager {
    pub fn new() -> Self {
        Self {
            interval: None,
            last_acked: true,
            generation: 0,
            timer: None,
        }
    }

    /// Start beating every `interval`, after a random first delay in
    /// `[0, interval)`. `on_tick` receives the timer's generation and returns
    /// false once nobody is listening, which stops the timer.
    pub fn arm<F>(&mut self, interval: Duration, on_tick: F)
    where
        F: Fn(u64) -> bool + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        self.interval = Some(interval);
        self.last_acked = true;

        let generation = self.generation;
        let jitter = interval.mul_f64(rand::thread_rng().gen::<f64>());
        tracing::debug!("waiting {}ms to send first heartbeat", jitter.as_millis());

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            if !on_tick(generation) {
                return;
            }
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !on_tick(generation) {
                    return;
                }
            }
        }));
    }

    /// Handle a tick reported by the timer for `generation`.
    pub fn on_tick(
        &mut self,
        generation: u64,
        sequence: Option<u64>,
        socket: Option<&SocketHandle>,
    ) -> Beat {
        if generation != self.generation || self.timer.is_none() {
            return Beat::Stale;
        }
        if !self.last_acked {
            tracing::warn!("last heartbeat was not acked, did we lose the connection?");
            self.cancel();
            return Beat::Missed;
        }
        tracing::debug!("sending heartbeat (sequence: {sequence:?})");
        self.last_acked = false;
        send(sequence, socket);
        Beat::Sent
    }

    pub fn on_ack(&mut self) {
        tracing::trace!("heartbeat acked");
        self.last_acked = true;
    }

    /// The server asked for a beat out of cycle. The schedule and the ack
    /// flag are left alone.
    pub fn on_server_request(&self, sequence: Option<u64>, socket: Option<&SocketHandle>) {
        tracing::debug!("server requested heartbeat (sequence: {sequence:?})");
        send(sequence, socket);
    }

    /// Stop the timer. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            self.generation += 1;
        }
        self.interval = None;
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn last_acked(&self) -> bool {
        self.last_acked
    }
}

impl Default for HeartbeatManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn send(sequence: Option<u64>, socket: Option<&SocketHandle>) {
    match socket {
        Some(socket) => {
            socket.send_payload(&events::heartbeat(sequence));
        }
        None => tracing::debug!("no socket to send heartbeat on"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::events::opcode;
    use crate::gateway::socket::Outbound;
    use tokio::sync::mpsc;

    fn ticker() -> (
        impl Fn(u64) -> bool + Send + 'static,
        mpsc::UnboundedReceiver<u64>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |generation| tx.send(generation).is_ok(), rx)
    }

    fn socket() -> (SocketHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SocketHandle::new(tx), rx)
    }

    fn sent_op(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<serde_json::Value> {
        match rx.try_recv().ok()? {
            Outbound::Frame(text) => serde_json::from_str(&text).ok(),
            Outbound::Close(_) => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_jittered_below_interval() {
        let mut hb = HeartbeatManager::new();
        let (on_tick, mut ticks) = ticker();
        let start = Instant::now();
        hb.arm(Duration::from_millis(45_000), on_tick);

        let generation = ticks.recv().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(45_000));

        let first = Instant::now();
        assert_eq!(ticks.recv().await.unwrap(), generation);
        let elapsed = first.elapsed();
        assert!(elapsed >= Duration::from_millis(45_000));
        assert!(elapsed < Duration::from_millis(45_002));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_then_detects_missed_ack() {
        let mut hb = HeartbeatManager::new();
        let (on_tick, mut ticks) = ticker();
        let (sock, mut out) = socket();
        hb.arm(Duration::from_millis(1000), on_tick);

        let generation = ticks.recv().await.unwrap();
        assert_eq!(hb.on_tick(generation, Some(4), Some(&sock)), Beat::Sent);
        let beat = sent_op(&mut out).unwrap();
        assert_eq!(beat["op"], opcode::HEARTBEAT);
        assert_eq!(beat["d"], 4);
        assert!(!hb.last_acked());

        let generation = ticks.recv().await.unwrap();
        assert_eq!(hb.on_tick(generation, Some(4), Some(&sock)), Beat::Missed);
        assert!(!hb.is_armed());
        assert!(sent_op(&mut out).is_none());

        // Nothing after a miss counts again.
        assert_eq!(hb.on_tick(generation, Some(4), Some(&sock)), Beat::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_keeps_beating() {
        let mut hb = HeartbeatManager::new();
        let (on_tick, mut ticks) = ticker();
        let (sock, mut out) = socket();
        hb.arm(Duration::from_millis(1000), on_tick);

        for _ in 0..3 {
            let generation = ticks.recv().await.unwrap();
            assert_eq!(hb.on_tick(generation, None, Some(&sock)), Beat::Sent);
            assert!(sent_op(&mut out).unwrap()["d"].is_null());
            hb.on_ack();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_leaves_one_live_timer() {
        let mut hb = HeartbeatManager::new();
        let (first_tick, mut first) = ticker();
        let (second_tick, mut second) = ticker();
        hb.arm(Duration::from_millis(1000), first_tick);
        hb.arm(Duration::from_millis(1000), second_tick);

        let generation = second.recv().await.unwrap();
        // The first timer was aborted and dropped its sender.
        assert!(first.recv().await.is_none());
        assert_eq!(hb.on_tick(generation - 1, None, None), Beat::Stale);
        assert_eq!(hb.on_tick(generation, None, None), Beat::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_makes_queued_ticks_stale() {
        let mut hb = HeartbeatManager::new();
        let (on_tick, mut ticks) = ticker();
        hb.arm(Duration::from_millis(1000), on_tick);
        let generation = ticks.recv().await.unwrap();

        hb.cancel();
        hb.cancel();
        assert!(!hb.is_armed());
        assert!(hb.interval().is_none());
        assert_eq!(hb.on_tick(generation, None, None), Beat::Stale);
        assert!(ticks.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_request_does_not_touch_schedule() {
        let mut hb = HeartbeatManager::new();
        let (on_tick, mut ticks) = ticker();
        let (sock, mut out) = socket();
        hb.arm(Duration::from_millis(1000), on_tick);

        let generation = ticks.recv().await.unwrap();
        assert_eq!(hb.on_tick(generation, Some(1), Some(&sock)), Beat::Sent);
        sent_op(&mut out).unwrap();

        hb.on_server_request(Some(2), Some(&sock));
        assert_eq!(sent_op(&mut out).unwrap()["d"], 2);
        assert!(!hb.last_acked());
        assert!(hb.is_armed());
        assert_eq!(hb.interval(), Some(Duration::from_millis(1000)));
    }
}
