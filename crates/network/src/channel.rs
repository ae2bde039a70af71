//! # Connection Channel
//!
//! One [`Channel`] per client session. It owns the pipeline, the current
//! protocol stage, a typed attribute map and an ordered task queue drained
//! by a dedicated Tokio task.
//!
//! # Architecture
//!
//! ```text
//!  transport ──fire_inbound──┐
//!  plugins ───write/execute──┼──> task queue ──> channel task ──> pipeline ──> outbound sink
//!  stages ──ctx.write────────┘        (FIFO)       (one per connection)
//! ```
//!
//! Every message, synthetic packet and pipeline mutation submitted through
//! the queue is applied in submission order, one at a time.
//!
//! # Lifecycle
//!
//! ```text
//! open ──> running ──close()──> closing (close hooks run on the task) ──> closed
//! ```

use crate::message::Message;
use crate::pipeline::Pipeline;
use crate::stage::{Flow, StageContext};
use dashmap::DashMap;
use packettap_core::{ConnectionId, Result, TapError};
use packettap_protocol::ProtocolStage;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

tokio::task_local! {
    static CURRENT_CHANNEL: ConnectionId;
}

/// Hook run synchronously when the protocol stage changes: `(channel, old, new)`
pub type StageHook = Arc<dyn Fn(&Arc<Channel>, ProtocolStage, ProtocolStage) + Send + Sync>;

/// Hook run once on the channel task when the channel closes
pub type CloseHook = Box<dyn FnOnce(&Arc<Channel>) + Send>;

type Job = Box<dyn FnOnce(&Arc<Channel>) + Send>;

/// Handle returned when registering a stage or close hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

enum ChannelTask {
    Inbound { after: Option<String>, message: Message },
    Outbound { from: Option<String>, message: Message },
    Run(Job),
    Close,
}

/// A client connection as seen by the pipeline
pub struct Channel {
    id: ConnectionId,
    pipeline: Pipeline,
    stage: AtomicU8,
    attributes: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
    tasks: mpsc::UnboundedSender<ChannelTask>,
    outbound: mpsc::UnboundedSender<Message>,
    stage_hooks: Mutex<Vec<(HookId, StageHook)>>,
    /// `None` once the hooks have run
    close_hooks: Mutex<Option<Vec<(HookId, CloseHook)>>>,
    next_hook: AtomicU64,
    closing: AtomicBool,
    closed: watch::Sender<bool>,
}

impl Channel {
    /// Open a channel and spawn its task
    ///
    /// # Arguments
    /// * `id` - Connection identifier
    /// * `pipeline` - Initial stages, head first
    ///
    /// # Returns
    /// The channel and the receiving end of its outbound sink. Messages that
    /// leave the head of the pipeline are delivered there in order.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(id: ConnectionId, pipeline: Pipeline) -> (Arc<Channel>, mpsc::UnboundedReceiver<Message>) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let channel = Arc::new(Channel {
            id,
            pipeline,
            stage: AtomicU8::new(ProtocolStage::Handshake.as_u8()),
            attributes: DashMap::new(),
            tasks: task_tx,
            outbound: out_tx,
            stage_hooks: Mutex::new(Vec::new()),
            close_hooks: Mutex::new(Some(Vec::new())),
            next_hook: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            closed,
        });

        tracing::debug!("Channel {} opened", id);
        tokio::spawn(CURRENT_CHANNEL.scope(id, run(channel.clone(), task_rx)));
        (channel, out_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Whether the caller is running on this channel's task
    pub fn in_event_loop(&self) -> bool {
        CURRENT_CHANNEL
            .try_with(|current| *current == self.id)
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    // --- Messages --------------------------------------------------------

    /// Queue a message entering the pipeline from the transport
    pub fn fire_inbound(&self, message: Message) -> Result<()> {
        self.submit_task(ChannelTask::Inbound { after: None, message })
    }

    /// Queue an inbound message that starts after stage `after`
    ///
    /// If that stage is gone by the time the message is processed, the
    /// message enters at the head.
    pub fn fire_inbound_after(&self, after: &str, message: Message) -> Result<()> {
        self.submit_task(ChannelTask::Inbound {
            after: Some(after.to_string()),
            message,
        })
    }

    /// Queue an outbound message entering at the tail
    pub fn write(&self, message: Message) -> Result<()> {
        self.submit_task(ChannelTask::Outbound { from: None, message })
    }

    /// Queue an outbound message as if stage `from` had written it: only the
    /// stages between `from` and the head see it
    pub fn write_from(&self, from: &str, message: Message) -> Result<()> {
        self.submit_task(ChannelTask::Outbound {
            from: Some(from.to_string()),
            message,
        })
    }

    // --- Tasks -----------------------------------------------------------

    /// Queue `job` to run on the channel task
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&Arc<Channel>) + Send + 'static,
    {
        self.submit_task(ChannelTask::Run(Box::new(job)))
    }

    /// Run `job` on the channel task and wait for its result
    ///
    /// Runs inline when already on the channel task.
    pub async fn submit<F, R>(self: &Arc<Self>, job: F) -> Result<R>
    where
        F: FnOnce(&Arc<Channel>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.in_event_loop() {
            return Ok(job(self));
        }

        let (tx, rx) = oneshot::channel();
        self.execute(move |channel| {
            let _ = tx.send(job(channel));
        })?;
        rx.await.map_err(|_| TapError::ChannelClosed(self.id.get()))
    }

    fn submit_task(&self, task: ChannelTask) -> Result<()> {
        if self.is_closed() {
            return Err(TapError::ChannelClosed(self.id.get()));
        }
        self.tasks
            .send(task)
            .map_err(|_| TapError::ChannelClosed(self.id.get()))
    }

    // --- Protocol stage --------------------------------------------------

    pub fn protocol_stage(&self) -> ProtocolStage {
        ProtocolStage::from_u8(self.stage.load(Ordering::Acquire)).unwrap_or(ProtocolStage::Handshake)
    }

    /// Switch protocol stage and run every stage hook before returning
    pub fn set_protocol_stage(self: &Arc<Self>, stage: ProtocolStage) {
        let old = self.stage.swap(stage.as_u8(), Ordering::AcqRel);
        let old = ProtocolStage::from_u8(old).unwrap_or(ProtocolStage::Handshake);
        if old == stage {
            return;
        }

        tracing::debug!("Channel {} stage {} -> {}", self.id, old, stage);
        let hooks: Vec<StageHook> = self.stage_hooks.lock().iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook(self, old, stage);
        }
    }

    pub fn on_stage_change(&self, hook: StageHook) -> HookId {
        let id = HookId(self.next_hook.fetch_add(1, Ordering::Relaxed));
        self.stage_hooks.lock().push((id, hook));
        id
    }

    pub fn remove_stage_hook(&self, id: HookId) -> bool {
        let mut hooks = self.stage_hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    // --- Attributes ------------------------------------------------------

    pub fn set_attribute<T: Any + Send + Sync>(&self, key: &'static str, value: T) {
        self.attributes.insert(key, Arc::new(value));
    }

    pub fn attribute<T: Any + Send + Sync>(&self, key: &'static str) -> Option<Arc<T>> {
        let value = self.attributes.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn has_attribute(&self, key: &'static str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn remove_attribute(&self, key: &'static str) -> bool {
        self.attributes.remove(key).is_some()
    }

    // --- Close -----------------------------------------------------------

    /// Register a hook run when the channel closes
    ///
    /// If the channel is already closed the hook runs immediately.
    pub fn on_close(self: &Arc<Self>, hook: CloseHook) -> HookId {
        let id = HookId(self.next_hook.fetch_add(1, Ordering::Relaxed));
        let mut hooks = self.close_hooks.lock();
        if let Some(pending) = hooks.as_mut() {
            pending.push((id, hook));
            return id;
        }
        drop(hooks);
        hook(self);
        id
    }

    /// Drop a close hook that has not run yet
    pub fn remove_close_hook(&self, id: HookId) -> bool {
        let mut hooks = self.close_hooks.lock();
        let Some(pending) = hooks.as_mut() else {
            return false;
        };
        let before = pending.len();
        pending.retain(|(hook_id, _)| *hook_id != id);
        pending.len() != before
    }

    /// Close hooks waiting for the channel to close
    pub fn close_hook_count(&self) -> usize {
        self.close_hooks.lock().as_ref().map_or(0, Vec::len)
    }

    /// Start closing; queued tasks before this call still run
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Channel {} closing", self.id);
        let _ = self.tasks.send(ChannelTask::Close);
    }

    /// Wait until the channel task has finished
    pub async fn wait_closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    // --- Pipeline traversal (channel task only) --------------------------

    fn run_inbound(self: &Arc<Self>, after: Option<&str>, message: Message) {
        let stages = self.pipeline.snapshot();
        let start = after
            .and_then(|name| stages.iter().position(|s| s.name == name))
            .map_or(0, |index| index + 1);

        let mut message = message;
        for named in &stages[start..] {
            let ctx = StageContext::new(self, &named.name);
            match named.stage.handle_inbound(&ctx, message) {
                Flow::Continue(next) => message = next,
                Flow::Stop => return,
            }
        }
        tracing::trace!("Channel {} inbound message reached the tail", self.id);
    }

    fn run_outbound(self: &Arc<Self>, from: Option<&str>, message: Message) {
        let stages = self.pipeline.snapshot();
        let end = from
            .and_then(|name| stages.iter().position(|s| s.name == name))
            .unwrap_or(stages.len());

        let mut message = message;
        for named in stages[..end].iter().rev() {
            let ctx = StageContext::new(self, &named.name);
            match named.stage.handle_outbound(&ctx, message) {
                Flow::Continue(next) => message = next,
                Flow::Stop => return,
            }
        }
        if self.outbound.send(message).is_err() {
            tracing::trace!("Channel {} outbound sink is gone", self.id);
        }
    }

    fn finish_close(self: &Arc<Self>) {
        self.closing.store(true, Ordering::Release);
        let hooks = self.close_hooks.lock().take().unwrap_or_default();
        for (_, hook) in hooks {
            hook(self);
        }
        self.closed.send_replace(true);
        tracing::debug!("Channel {} closed", self.id);
    }
}

async fn run(channel: Arc<Channel>, mut tasks: mpsc::UnboundedReceiver<ChannelTask>) {
    while let Some(task) = tasks.recv().await {
        match task {
            ChannelTask::Inbound { after, message } => channel.run_inbound(after.as_deref(), message),
            ChannelTask::Outbound { from, message } => channel.run_outbound(from.as_deref(), message),
            ChannelTask::Run(job) => job(&channel),
            ChannelTask::Close => break,
        }
    }
    channel.finish_close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    /// Appends its name to wire messages in both directions
    struct Tag(&'static str);

    impl Tag {
        fn tag(&self, message: Message) -> Message {
            match message {
                Message::Wire(bytes) => {
                    let mut data = bytes.to_vec();
                    data.extend_from_slice(self.0.as_bytes());
                    Message::Wire(Bytes::from(data))
                }
                other => other,
            }
        }
    }

    impl Stage for Tag {
        fn handle_inbound(&self, ctx: &StageContext<'_>, message: Message) -> Flow {
            let message = self.tag(message);
            if self.0 == "C" {
                // Echo back so the test can observe the inbound result
                ctx.write(message);
                return Flow::Stop;
            }
            Flow::Continue(message)
        }

        fn handle_outbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
            Flow::Continue(self.tag(message))
        }
    }

    fn pipeline() -> Pipeline {
        let pipeline = Pipeline::new();
        pipeline.add_last("a", Arc::new(Tag("A"))).unwrap();
        pipeline.add_last("b", Arc::new(Tag("B"))).unwrap();
        pipeline.add_last("c", Arc::new(Tag("C"))).unwrap();
        pipeline
    }

    fn text(message: Message) -> String {
        match message {
            Message::Wire(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inbound_and_outbound_order() {
        let (channel, mut out) = Channel::open(ConnectionId::new(1), pipeline());

        channel.fire_inbound(Message::wire("x")).unwrap();
        // inbound a, b, c; c writes at the tail; outbound c, b, a
        assert_eq!(text(out.recv().await.unwrap()), "xABCCBA");

        channel.fire_inbound_after("a", Message::wire("y")).unwrap();
        assert_eq!(text(out.recv().await.unwrap()), "yBCCBA");

        channel.write_from("b", Message::wire("z")).unwrap();
        assert_eq!(text(out.recv().await.unwrap()), "zA");
    }

    #[tokio::test]
    async fn test_missing_start_stage_enters_at_head() {
        let (channel, mut out) = Channel::open(ConnectionId::new(2), pipeline());
        channel.fire_inbound_after("gone", Message::wire("")).unwrap();
        assert_eq!(text(out.recv().await.unwrap()), "ABCCBA");
    }

    #[tokio::test]
    async fn test_execute_runs_in_event_loop() {
        let (channel, _out) = Channel::open(ConnectionId::new(3), Pipeline::new());
        assert!(!channel.in_event_loop());

        let inside = channel.submit(|channel| channel.in_event_loop()).await.unwrap();
        assert!(inside);
    }

    #[tokio::test]
    async fn test_stage_hooks() {
        let (channel, _out) = Channel::open(ConnectionId::new(4), Pipeline::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let hook = channel.on_stage_change(Arc::new(move |_, old, new| {
            assert_eq!(old, ProtocolStage::Handshake);
            assert_eq!(new, ProtocolStage::Login);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        channel.set_protocol_stage(ProtocolStage::Login);
        channel.set_protocol_stage(ProtocolStage::Login);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(channel.remove_stage_hook(hook));
        channel.set_protocol_stage(ProtocolStage::Play);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channel.protocol_stage(), ProtocolStage::Play);
    }

    #[tokio::test]
    async fn test_attributes() {
        let (channel, _out) = Channel::open(ConnectionId::new(5), Pipeline::new());
        channel.set_attribute("player", "Notch".to_string());

        assert_eq!(channel.attribute::<String>("player").unwrap().as_str(), "Notch");
        assert!(channel.attribute::<u32>("player").is_none());
        assert!(channel.remove_attribute("player"));
        assert!(!channel.has_attribute("player"));
    }

    #[tokio::test]
    async fn test_close_runs_hooks_once() {
        let (channel, _out) = Channel::open(ConnectionId::new(6), Pipeline::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        channel.on_close(Box::new(move |channel| {
            assert!(channel.in_event_loop());
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let counter = calls.clone();
        let removed = channel.on_close(Box::new(move |_| {
            counter.fetch_add(100, Ordering::SeqCst);
        }));
        assert_eq!(channel.close_hook_count(), 2);
        assert!(channel.remove_close_hook(removed));
        assert!(!channel.remove_close_hook(removed));
        assert_eq!(channel.close_hook_count(), 1);

        channel.close();
        channel.close();
        channel.wait_closed().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channel.close_hook_count(), 0);

        assert!(matches!(channel.write(Message::wire("late")), Err(TapError::ChannelClosed(6))));

        let counter = calls.clone();
        channel.on_close(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
