//! Wiring of a running server: collaborators, dispatcher, resource tree and HTTP router.

use axum::Router;
use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::dispatcher::Dispatcher;
use crate::hooks::functions::FunctionRegistry;
use crate::http;
use crate::resource::tree::ResourceTree;

pub struct App {
    pub tree: Arc<ResourceTree>,
    /// In-process functions; register handlers here before serving.
    pub functions: Arc<FunctionRegistry>,
    pub router: Router,
}

impl App {
    /// Must be called from within a tokio runtime, since the root node is spawned here.
    pub fn build(config: &Config) -> Self {
        let (collaborators, functions) = config.collaborators();
        let dispatcher = Dispatcher::new(collaborators);
        let tree = ResourceTree::start(dispatcher, config.tree_settings());
        let router = http::router(tree.clone());
        Self {
            tree,
            functions,
            router,
        }
    }
}
