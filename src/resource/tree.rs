use super::node::{Mailbox, RequestHandler, ResourceNode, TreeRuntime, TreeSettings, TreeStats};
use super::types::{Envelope, Request, ResourcePath, Response};
use crate::error::{ApiError, ApiResult};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Entry point into the resource tree: owns the root node's mailbox.
pub struct ResourceTree {
    root: Mailbox,
    stats: Arc<TreeStats>,
    task: JoinHandle<()>,
}

impl ResourceTree {
    /// Spawns the root node. Must be called from within a tokio runtime.
    pub fn start(handler: Arc<dyn RequestHandler>, settings: TreeSettings) -> Arc<Self> {
        let stats = Arc::new(TreeStats::default());
        let runtime = Arc::new(TreeRuntime {
            handler,
            settings,
            stats: stats.clone(),
        });

        let (root, mailbox) = ResourceNode::spawn(ResourcePath::root(), runtime);
        let task = tokio::spawn(root.run_boxed());
        tracing::info!("Resource tree started");

        Arc::new(Self {
            root: mailbox,
            stats,
            task,
        })
    }

    /// Delivers a request to the root and waits for the addressee node's response.
    pub async fn submit(&self, request: Request) -> ApiResult<Response> {
        let (envelope, reply) = Envelope::new(request);
        self.root
            .send(envelope)
            .await
            .map_err(|_| ApiError::internal("Resource tree is not running."))?;
        reply
            .await
            .map_err(|_| ApiError::internal("Resource node dropped the request."))
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
