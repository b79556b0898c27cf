//! Resource Node Actor
//!
//! Each live resource path is owned by one tokio task running [`ResourceNode::run`].
//! A node reads its mailbox strictly in order. Messages addressed to the node itself go to
//! the [`RequestHandler`]; anything deeper is forwarded to the direct child on the way,
//! which the node spawns the first time it is needed.
//!
//! ## Lifecycle
//! - **Spawn**: only a node's own loop creates its children, so a path never gets two nodes.
//! - **Forward**: an awaited send into the child's bounded mailbox. A backlogged child slows
//!   its ancestors down but never its siblings.
//! - **Reap**: a non-root node idle for `idle_timeout` with no live children closes its
//!   mailbox, handles whatever was already queued and exits. The parent sees the closed
//!   mailbox on its next forward, waits for the old task to finish and respawns the child.

use super::router;
use super::types::{Envelope, NodeInfo, NodeKind, Request, ResourcePath, Response};

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type Mailbox = mpsc::Sender<Envelope>;

/// Executes a request that has reached its addressee node.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, node: &NodeInfo, request: Request) -> Response;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSettings {
    pub mailbox_capacity: usize,
    /// `None` keeps every node alive for the lifetime of the process.
    pub idle_timeout: Option<Duration>,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Counters shared by every node of one tree.
#[derive(Debug, Default)]
pub struct TreeStats {
    spawned: AtomicUsize,
    reaped: AtomicUsize,
}

impl TreeStats {
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn reaped(&self) -> usize {
        self.reaped.load(Ordering::SeqCst)
    }

    /// Nodes currently alive, the root included.
    pub fn live(&self) -> usize {
        self.spawned() - self.reaped()
    }
}

/// Everything a node needs besides its own state. One instance is shared by the whole tree.
pub struct TreeRuntime {
    pub handler: Arc<dyn RequestHandler>,
    pub settings: TreeSettings,
    pub stats: Arc<TreeStats>,
}

struct ChildHandle {
    mailbox: Mailbox,
    task: JoinHandle<()>,
}

pub struct ResourceNode {
    info: NodeInfo,
    children: HashMap<String, ChildHandle>,
    mailbox: mpsc::Receiver<Envelope>,
    runtime: Arc<TreeRuntime>,
}

impl ResourceNode {
    /// Builds a node and its mailbox. Pure construction: nothing runs until [`run`](Self::run).
    pub fn spawn(path: ResourcePath, runtime: Arc<TreeRuntime>) -> (Self, Mailbox) {
        let (sender, mailbox) = mpsc::channel(runtime.settings.mailbox_capacity.max(1));
        runtime.stats.spawned.fetch_add(1, Ordering::SeqCst);
        let node = Self {
            info: NodeInfo::for_path(path),
            children: HashMap::new(),
            mailbox,
            runtime,
        };
        (node, sender)
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// [`run`](Self::run) as a sendable boxed future. Nodes spawn their children from inside
    /// `run`, so the spawned future type must be named to stay `Send`.
    pub fn run_boxed(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self.run())
    }

    /// The node's message loop. Returns once the node has retired and drained its mailbox.
    pub async fn run(mut self) {
        tracing::debug!(
            "{}: started as {} bound to {:?}",
            self.info.path,
            self.info.kind.as_str(),
            self.info.class
        );

        loop {
            let next = match self.runtime.settings.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, self.mailbox.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if self.try_retire() {
                            break;
                        }
                        continue;
                    }
                },
                None => self.mailbox.recv().await,
            };

            match next {
                Some(envelope) => self.accept(envelope).await,
                None => break,
            }
        }

        // The mailbox is closed: handle what was queued before closing, then stop the subtree.
        while let Some(envelope) = self.mailbox.recv().await {
            self.accept(envelope).await;
        }
        for (_, child) in self.children.drain() {
            drop(child.mailbox);
            if let Err(e) = child.task.await {
                tracing::warn!("{}: child task ended abnormally: {}", self.info.path, e);
            }
        }

        tracing::debug!("{}: stopped", self.info.path);
    }

    async fn accept(&mut self, envelope: Envelope) {
        if envelope.request.target == self.info.path {
            let Envelope { request, reply } = envelope;
            tracing::debug!(
                "{}: handling {} after {} hops",
                self.info.path,
                request.verb,
                request.hops
            );
            let response = self.runtime.handler.handle(&self.info, request).await;

            if reply.is_closed() {
                tracing::warn!(
                    "{}: caller abandoned the request, dropping response",
                    self.info.path
                );
                return;
            }
            if reply.send(response).is_err() {
                tracing::warn!("{}: failed to deliver response", self.info.path);
            }
        } else {
            self.forward(envelope).await;
        }
    }

    async fn forward(&mut self, mut envelope: Envelope) {
        let segment = router::next_segment(envelope.request.target.as_str(), self.info.path.as_str())
            .to_string();
        envelope.request.hops += 1;

        loop {
            let runtime = &self.runtime;
            let own_path = &self.info.path;
            let child = self.children.entry(segment.clone()).or_insert_with(|| {
                let (node, mailbox) = ResourceNode::spawn(own_path.child(&segment), runtime.clone());
                let task = tokio::spawn(node.run_boxed());
                ChildHandle { mailbox, task }
            });

            match child.mailbox.send(envelope).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // The child retired. Let it finish its queue before a new one takes over.
                    if let Some(stale) = self.children.remove(&segment)
                        && let Err(e) = stale.task.await
                    {
                        tracing::warn!("{}: child task ended abnormally: {}", self.info.path, e);
                    }
                    envelope = returned;
                }
            }
        }
    }

    /// Drops finished children and, if nothing is left below a non-root node, closes the
    /// mailbox. Returns whether the node is retiring.
    fn try_retire(&mut self) -> bool {
        self.children.retain(|_, child| !child.task.is_finished());
        if self.info.kind == NodeKind::Root || !self.children.is_empty() {
            return false;
        }
        self.mailbox.close();
        self.runtime.stats.reaped.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("{}: idle, retiring", self.info.path);
        true
    }
}
