//! Generic operation listeners (posts, comments, transfers, custom JSON).
//!
//! Subscribers see every matching operation, whether or not it carries a
//! payload envelope. Callbacks run synchronously on the ingestion loop and
//! should hand heavy work off to their own tasks.

use std::sync::{Arc, RwLock};

use crate::types::{CommentOp, CustomJsonOp, Operation, OperationContext, TransferOp};

pub type CommentCallback = Arc<dyn Fn(&CommentOp, &OperationContext) + Send + Sync>;
pub type TransferCallback = Arc<dyn Fn(&TransferOp, &OperationContext) + Send + Sync>;
pub type CustomJsonCallback = Arc<dyn Fn(&CustomJsonOp, &OperationContext) + Send + Sync>;

/// Registered listeners, grouped by operation kind.
#[derive(Default)]
pub struct Subscriptions {
    comments: RwLock<Vec<CommentCallback>>,
    posts: RwLock<Vec<CommentCallback>>,
    /// (receiving account, callback)
    transfers: RwLock<Vec<(String, TransferCallback)>>,
    custom_json: RwLock<Vec<CustomJsonCallback>>,
    /// (custom JSON id, callback)
    custom_json_ids: RwLock<Vec<(String, CustomJsonCallback)>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies (comments with a parent author).
    pub fn on_comment<F>(&self, callback: F)
    where
        F: Fn(&CommentOp, &OperationContext) + Send + Sync + 'static,
    {
        self.comments.write().unwrap().push(Arc::new(callback));
    }

    /// Top-level posts (comments without a parent author).
    pub fn on_post<F>(&self, callback: F)
    where
        F: Fn(&CommentOp, &OperationContext) + Send + Sync + 'static,
    {
        self.posts.write().unwrap().push(Arc::new(callback));
    }

    /// Transfers received by `account`.
    pub fn on_transfer<F>(&self, account: impl Into<String>, callback: F)
    where
        F: Fn(&TransferOp, &OperationContext) + Send + Sync + 'static,
    {
        self.transfers
            .write()
            .unwrap()
            .push((account.into(), Arc::new(callback)));
    }

    /// Every custom JSON operation.
    pub fn on_custom_json<F>(&self, callback: F)
    where
        F: Fn(&CustomJsonOp, &OperationContext) + Send + Sync + 'static,
    {
        self.custom_json.write().unwrap().push(Arc::new(callback));
    }

    /// Custom JSON operations whose operation id equals `id`.
    pub fn on_custom_json_id<F>(&self, id: impl Into<String>, callback: F)
    where
        F: Fn(&CustomJsonOp, &OperationContext) + Send + Sync + 'static,
    {
        self.custom_json_ids
            .write()
            .unwrap()
            .push((id.into(), Arc::new(callback)));
    }

    /// Deliver `op` to every matching subscriber.
    ///
    /// Callbacks are cloned out before being called so a callback may
    /// register further subscribers without deadlocking.
    pub fn notify(&self, op: &Operation, ctx: &OperationContext) {
        match op {
            Operation::Comment(comment) => {
                let list = if comment.is_post() { &self.posts } else { &self.comments };
                let callbacks: Vec<_> = list.read().unwrap().clone();
                for cb in callbacks {
                    cb(comment, ctx);
                }
            }
            Operation::Transfer(transfer) => {
                let callbacks: Vec<_> = self
                    .transfers
                    .read()
                    .unwrap()
                    .iter()
                    .filter(|(account, _)| *account == transfer.to)
                    .map(|(_, cb)| cb.clone())
                    .collect();
                for cb in callbacks {
                    cb(transfer, ctx);
                }
            }
            Operation::CustomJson(custom) => {
                let mut callbacks: Vec<_> = self.custom_json.read().unwrap().clone();
                callbacks.extend(
                    self.custom_json_ids
                        .read()
                        .unwrap()
                        .iter()
                        .filter(|(id, _)| *id == custom.id)
                        .map(|(_, cb)| cb.clone()),
                );
                for cb in callbacks {
                    cb(custom, ctx);
                }
            }
            Operation::Other { .. } => {}
        }
    }
}
