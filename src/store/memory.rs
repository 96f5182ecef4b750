// 内存实时数据库
//
// 用一棵 JSON 树模拟实时数据库的路径语义：
// 写入子路径会自动创建父节点，删除最后一个子节点会移除空父节点

use super::{split_path, KeyValueStore};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: RwLock<Value>,
    /// 故障注入：为 true 时所有写入失败
    fail_writes: AtomicBool,
    /// 成功写入次数
    write_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
            fail_writes: AtomicBool::new(false),
            write_count: AtomicUsize::new(0),
        }
    }

    /// 打开/关闭写入故障注入
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("simulated write failure".to_string()));
        }
        Ok(())
    }

    /// 找到（必要时创建）路径对应的节点
    fn node_mut<'a>(root: &'a mut Value, segments: &[&str]) -> &'a mut Value {
        let mut node = root;
        for segment in segments {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                // 上面保证了 node 是 object
                _ => unreachable!(),
            };
        }
        node
    }

    fn remove_at(node: &mut Value, segments: &[&str]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        let Value::Object(map) = node else {
            return;
        };
        if rest.is_empty() {
            map.remove(*first);
            return;
        }
        if let Some(child) = map.get_mut(*first) {
            Self::remove_at(child, rest);
            if matches!(child, Value::Object(m) if m.is_empty()) {
                map.remove(*first);
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.check_writable()?;

        let mut root = self.root.write();
        if value.is_null() {
            Self::remove_at(&mut root, &segments);
        } else {
            *Self::node_mut(&mut root, &segments) = value;
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.check_writable()?;

        let Value::Object(fields) = partial else {
            return Err(StoreError::Other("update 只接受对象".to_string()));
        };

        let mut root = self.root.write();
        let node = Self::node_mut(&mut root, &segments);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            for (key, value) in fields {
                if value.is_null() {
                    map.remove(&key);
                } else {
                    map.insert(key, value);
                }
            }
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        let root = self.root.read();

        let mut node = &*root;
        for segment in segments {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node.clone()))
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.check_writable()?;
        Self::remove_at(&mut self.root.write(), &segments);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_read_nested() {
        let store = MemoryStore::new();
        store
            .write("users/u1/files/f1", json!({"name": "a.txt"}))
            .await
            .unwrap();
        store
            .write("users/u1/files/f2", json!({"name": "b.txt"}))
            .await
            .unwrap();

        let files = store.read("users/u1/files").await.unwrap().unwrap();
        assert_eq!(files.as_object().unwrap().len(), 2);
        assert_eq!(
            store.read("users/u1/files/f1/name").await.unwrap(),
            Some(json!("a.txt"))
        );
        assert_eq!(store.read("users/u2").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_update_merges() {
        let store = MemoryStore::new();
        store
            .write("users/u1/settings", json!({"maxFileSize": 1, "chunkSize": 2}))
            .await
            .unwrap();
        store
            .update("users/u1/settings", json!({"chunkSize": 4}))
            .await
            .unwrap();

        let settings = store.read("users/u1/settings").await.unwrap().unwrap();
        assert_eq!(settings, json!({"maxFileSize": 1, "chunkSize": 4}));
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_parents() {
        let store = MemoryStore::new();
        store.write("users/u1/shares/s1", json!({"fileId": "f1"})).await.unwrap();
        store.remove("users/u1/shares/s1").await.unwrap();

        assert_eq!(store.read("users/u1/shares").await.unwrap(), None);
        assert_eq!(store.read("users").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.write("users/u1/files/f1", json!(1)).await.is_err());
        store.set_fail_writes(false);
        assert!(store.write("users/u1/files/f1", json!(1)).await.is_ok());
    }
}
