//! Update source: long-polls the chat transport and publishes updates onto the
//! delivery channel.
//!
//! The poller owns the offset. It is the only writer, and nothing else reads it,
//! so no locking is involved. Failed polls never escape this module; they are
//! logged and retried after a fixed delay.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::{
    domain::UpdateId,
    messaging::{port::UpdatesPort, types::IncomingUpdate},
    Error,
};

#[derive(Clone, Copy, Debug)]
pub struct PollerConfig {
    /// Server-side wait for a single long poll.
    pub poll_timeout: Duration,
    /// Fixed wait after a failed poll before trying again.
    pub retry_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Next update id to ask for. Only ever moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offset(Option<UpdateId>);

impl Offset {
    pub fn get(self) -> Option<UpdateId> {
        self.0
    }

    /// Acknowledge `id`: the next poll starts at `id + 1` unless it is already past it.
    pub fn advance(&mut self, id: UpdateId) {
        let next = UpdateId(id.0.saturating_add(1));
        match self.0 {
            Some(cur) if cur >= next => {}
            _ => self.0 = Some(next),
        }
    }

    /// Whether `id` was already acknowledged.
    pub fn covers(self, id: UpdateId) -> bool {
        self.0.is_some_and(|cur| id < cur)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PollState {
    Polling,
    WaitingAfterError,
}

/// What happened over the poller's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub delivered: usize,
    pub failures: usize,
    pub final_offset: Option<UpdateId>,
}

enum CycleOutcome {
    Published,
    ReceiverGone,
}

pub struct UpdatePoller {
    updates: Arc<dyn UpdatesPort>,
    cfg: PollerConfig,
    offset: Offset,
    span: Span,
}

impl UpdatePoller {
    pub fn new(updates: Arc<dyn UpdatesPort>, cfg: PollerConfig, span: Span) -> Self {
        Self {
            updates,
            cfg,
            offset: Offset::default(),
            span,
        }
    }

    /// Poll until `cancel` fires or the receiving side of `tx` is dropped.
    ///
    /// Cancellation is observed between polls: a poll in flight is allowed to
    /// return and its updates are published first. Dropping `tx` on return closes
    /// the channel, which ends the consumer's drain.
    pub async fn run(
        mut self,
        tx: UnboundedSender<IncomingUpdate>,
        cancel: CancellationToken,
    ) -> PollSummary {
        let span = self.span.clone();
        async move {
            let mut summary = PollSummary::default();
            let mut state = PollState::Polling;
            let mut consecutive_failures = 0u32;

            info!(timeout = ?self.cfg.poll_timeout, "update polling started");

            loop {
                match state {
                    PollState::Polling => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        match self.poll_once(&tx, &mut summary).await {
                            Ok(CycleOutcome::Published) => consecutive_failures = 0,
                            Ok(CycleOutcome::ReceiverGone) => {
                                warn!("delivery channel closed by consumer; stopping poller");
                                break;
                            }
                            Err(e) => {
                                consecutive_failures += 1;
                                summary.failures += 1;
                                warn!(
                                    error = %e,
                                    consecutive_failures,
                                    retry_in = ?self.cfg.retry_delay,
                                    "polling updates failed"
                                );
                                state = PollState::WaitingAfterError;
                            }
                        }
                    }
                    PollState::WaitingAfterError => {
                        tokio::select! {
                          _ = cancel.cancelled() => break,
                          _ = sleep(self.cfg.retry_delay) => state = PollState::Polling,
                        }
                    }
                }
            }

            summary.final_offset = self.offset.get();
            info!(
                delivered = summary.delivered,
                failures = summary.failures,
                offset = ?summary.final_offset,
                "update polling stopped"
            );
            summary
        }
        .instrument(span)
        .await
    }

    /// One long poll followed by publishing its batch.
    async fn poll_once(
        &mut self,
        tx: &UnboundedSender<IncomingUpdate>,
        summary: &mut PollSummary,
    ) -> Result<CycleOutcome, Error> {
        let batch = self
            .updates
            .get_updates(self.offset.get(), self.cfg.poll_timeout)
            .await?;

        // Dedup against the offset as it stood before this batch; within the
        // batch, a repeated id is dropped but a lower one is still delivered.
        let floor = self.offset;
        let mut seen = HashSet::with_capacity(batch.len());

        for update in batch {
            let id = update.update_id;
            if floor.covers(id) || !seen.insert(id) {
                debug!(update_id = id.0, "skipping already delivered update");
                continue;
            }

            if tx.send(update).is_err() {
                return Ok(CycleOutcome::ReceiverGone);
            }
            self.offset.advance(id);
            summary.delivered += 1;
            debug!(update_id = id.0, "update queued");
        }

        Ok(CycleOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::LinkMessage;
    use crate::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Notify};

    fn update(id: i64) -> IncomingUpdate {
        IncomingUpdate {
            update_id: UpdateId(id),
            message: Some(LinkMessage::default()),
        }
    }

    /// Scripted transport: replays responses in order, then cancels the token
    /// (or idles) once the script is exhausted.
    struct ScriptedUpdates {
        script: Mutex<VecDeque<Result<Vec<IncomingUpdate>>>>,
        offsets: Mutex<Vec<Option<UpdateId>>>,
        on_exhausted: CancellationToken,
    }

    impl ScriptedUpdates {
        fn new(script: Vec<Result<Vec<IncomingUpdate>>>, on_exhausted: CancellationToken) -> Self {
            Self {
                script: Mutex::new(script.into()),
                offsets: Mutex::new(Vec::new()),
                on_exhausted,
            }
        }

        fn offsets(&self) -> Vec<Option<UpdateId>> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdatesPort for ScriptedUpdates {
        async fn get_updates(
            &self,
            offset: Option<UpdateId>,
            _timeout: Duration,
        ) -> Result<Vec<IncomingUpdate>> {
            self.offsets.lock().unwrap().push(offset);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(resp) => resp,
                None => {
                    self.on_exhausted.cancel();
                    Ok(Vec::new())
                }
            }
        }
    }

    fn fast() -> PollerConfig {
        PollerConfig {
            poll_timeout: Duration::from_millis(10),
            retry_delay: Duration::from_millis(1),
        }
    }

    async fn run_script(
        script: Vec<Result<Vec<IncomingUpdate>>>,
    ) -> (PollSummary, Vec<UpdateId>, Vec<Option<UpdateId>>) {
        let cancel = CancellationToken::new();
        let port = Arc::new(ScriptedUpdates::new(script, cancel.clone()));
        let poller = UpdatePoller::new(port.clone(), fast(), Span::none());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = poller.run(tx, cancel).await;

        let mut ids = Vec::new();
        while let Some(u) = rx.recv().await {
            ids.push(u.update_id);
        }
        (summary, ids, port.offsets())
    }

    fn ids(raw: &[i64]) -> Vec<UpdateId> {
        raw.iter().copied().map(UpdateId).collect()
    }

    #[test]
    fn offset_never_moves_backwards() {
        let mut off = Offset::default();
        assert_eq!(off.get(), None);
        off.advance(UpdateId(10));
        assert_eq!(off.get(), Some(UpdateId(11)));
        off.advance(UpdateId(4));
        assert_eq!(off.get(), Some(UpdateId(11)));
        off.advance(UpdateId(11));
        assert_eq!(off.get(), Some(UpdateId(12)));
        assert!(off.covers(UpdateId(11)));
        assert!(!off.covers(UpdateId(12)));
    }

    #[tokio::test]
    async fn delivers_in_order_and_advances_offset() {
        let (summary, got, offsets) =
            run_script(vec![Ok(vec![update(1), update(2)]), Ok(vec![]), Ok(vec![update(3)])]).await;

        assert_eq!(got, ids(&[1, 2, 3]));
        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.final_offset, Some(UpdateId(4)));
        assert_eq!(
            offsets,
            vec![None, Some(UpdateId(3)), Some(UpdateId(3)), Some(UpdateId(4))]
        );
    }

    #[tokio::test]
    async fn overlapping_responses_are_not_redelivered() {
        let (_, got, _) = run_script(vec![
            Ok(vec![update(5), update(6)]),
            Ok(vec![update(6), update(7)]),
            Ok(vec![update(5), update(6), update(7), update(8)]),
            Ok(vec![update(9), update(9)]),
        ])
        .await;

        assert_eq!(got, ids(&[5, 6, 7, 8, 9]));
    }

    #[tokio::test]
    async fn out_of_order_batch_uses_max_id() {
        let (summary, got, offsets) = run_script(vec![Ok(vec![update(8), update(6), update(7)])]).await;

        assert_eq!(got, ids(&[8, 6, 7]));
        assert_eq!(summary.final_offset, Some(UpdateId(9)));
        assert_eq!(offsets[1], Some(UpdateId(9)));
    }

    #[tokio::test]
    async fn failures_retry_without_moving_offset() {
        let (summary, got, offsets) = run_script(vec![
            Ok(vec![update(1)]),
            Err(Error::Telegram("connection reset".to_string())),
            Err(Error::Json(serde_json::from_str::<u8>("{").unwrap_err())),
            Ok(vec![update(2)]),
        ])
        .await;

        assert_eq!(got, ids(&[1, 2]));
        assert_eq!(summary.failures, 2);
        assert_eq!(
            &offsets[..4],
            &[None, Some(UpdateId(2)), Some(UpdateId(2)), Some(UpdateId(2))]
        );
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(sorted, offsets, "offset must be non-decreasing");
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let cancel = CancellationToken::new();
        let port = Arc::new(ScriptedUpdates::new(
            vec![Ok(vec![update(1)]), Ok(vec![update(2)])],
            cancel.clone(),
        ));
        let poller = UpdatePoller::new(port, fast(), Span::none());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let summary = poller.run(tx, cancel.clone()).await;
        assert_eq!(summary.delivered, 0);
        assert!(!cancel.is_cancelled());
    }

    /// Transport whose first poll blocks until released.
    struct GatedUpdates {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl UpdatesPort for GatedUpdates {
        async fn get_updates(
            &self,
            offset: Option<UpdateId>,
            _timeout: Duration,
        ) -> Result<Vec<IncomingUpdate>> {
            if offset.is_some() {
                panic!("no poll may start after cancellation");
            }
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![update(41), update(42)])
        }
    }

    #[tokio::test]
    async fn cancellation_lets_inflight_poll_finish() {
        let port = Arc::new(GatedUpdates {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let cancel = CancellationToken::new();
        let poller = UpdatePoller::new(port.clone(), fast(), Span::none());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(poller.run(tx, cancel.clone()));
        port.entered.notified().await;
        cancel.cancel();
        port.release.notify_one();

        let summary = handle.await.unwrap();
        assert_eq!(summary.delivered, 2);

        let mut got = Vec::new();
        while let Some(u) = rx.recv().await {
            got.push(u.update_id);
        }
        assert_eq!(got, ids(&[41, 42]));
    }

    #[tokio::test]
    async fn cancellation_interrupts_retry_wait() {
        let cancel = CancellationToken::new();
        let port = Arc::new(ScriptedUpdates::new(
            vec![Err(Error::Telegram("down".to_string()))],
            CancellationToken::new(),
        ));
        let cfg = PollerConfig {
            poll_timeout: Duration::from_millis(10),
            retry_delay: Duration::from_secs(3600),
        };
        let poller = UpdatePoller::new(port.clone(), cfg, Span::none());
        let (tx, _rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(poller.run(tx, cancel.clone()));
        while port.offsets().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller must stop during the retry wait")
            .unwrap();
        assert_eq!(summary.failures, 1);
    }
}
