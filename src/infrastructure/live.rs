//! 实时集合 - 基础设施层
//!
//! 包装网关的订阅通道：每次变更整体替换本地快照，不做增量合并。

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::sync::watch;
use tracing::warn;

use super::gateway::{Collection, StoredDoc};
use crate::models::{Subject, Task};

/// 可以从网关文档 id 回填的记录
pub trait Identified {
    fn set_id(&mut self, id: String);
}

impl Identified for Subject {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Identified for Task {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// 解码一份文档；格式错误的文档记录警告后跳过
pub fn decode_doc<T: DeserializeOwned + Identified>(
    collection: Collection,
    doc: &StoredDoc,
) -> Option<T> {
    match serde_json::from_value::<T>(doc.data.clone()) {
        Ok(mut record) => {
            record.set_id(doc.id.clone());
            Some(record)
        }
        Err(e) => {
            warn!("跳过无法解析的文档 {}/{}: {}", collection, doc.id, e);
            None
        }
    }
}

pub fn decode_docs<T: DeserializeOwned + Identified>(
    collection: Collection,
    docs: &[StoredDoc],
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| decode_doc(collection, doc))
        .collect()
}

/// 单个集合的响应式存储
pub struct LiveCollection<T> {
    collection: Collection,
    receiver: watch::Receiver<Vec<StoredDoc>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Identified> LiveCollection<T> {
    pub fn new(collection: Collection, receiver: watch::Receiver<Vec<StoredDoc>>) -> Self {
        Self {
            collection,
            receiver,
            _marker: PhantomData,
        }
    }

    /// 当前快照
    pub fn current(&self) -> Vec<T> {
        decode_docs(self.collection, &self.receiver.borrow())
    }

    /// 等待下一次变更并返回新的快照；网关关闭时返回 `None`
    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.receiver.changed().await.ok()?;
        Some(decode_docs(
            self.collection,
            &self.receiver.borrow_and_update(),
        ))
    }
}

impl<T> Clone for LiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            receiver: self.receiver.clone(),
            _marker: PhantomData,
        }
    }
}
