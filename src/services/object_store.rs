//! The object store seam.
//!
//! Everything above the storage layer talks to the bucket through
//! [`ObjectStore`], so the resolver and handlers never see SQLite or the disk
//! layout. `StorageService` is the production implementation.

use crate::{
    models::object::Object,
    services::storage_service::{ListObjectsParams, MAX_LIST_KEYS, StorageResult, StorageService},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, stream};
use std::{io, pin::Pin};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Payload reader. Seekable so ranged responses can skip ahead.
pub trait ObjectRead: AsyncRead + AsyncSeek + Send {}

impl<T: AsyncRead + AsyncSeek + Send> ObjectRead for T {}

pub type ObjectReader = Pin<Box<dyn ObjectRead>>;

/// An object's attributes plus a reader over its payload.
pub struct ObjectBody {
    pub object: Object,
    pub reader: ObjectReader,
}

/// One entry of a bucket listing: the name, and its attributes or the
/// error hit while reading them.
#[derive(Debug)]
pub struct ListedObject {
    pub name: String,
    pub attrs: StorageResult<Object>,
}

/// Named-object operations over the single bucket of this process.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    fn bucket_name(&self) -> &str;

    /// Every object in the bucket with its attributes, in key order.
    async fn list(&self) -> StorageResult<Vec<ListedObject>>;

    /// Attributes of one object; doubles as the existence check.
    async fn attrs(&self, name: &str) -> StorageResult<Object>;

    /// Streamed read.
    async fn get(&self, name: &str) -> StorageResult<ObjectBody>;

    /// Streamed write, replacing whatever is stored under `name`.
    async fn put(
        &self,
        name: &str,
        content_type: Option<String>,
        body: ByteStream,
    ) -> StorageResult<Object>;

    async fn ping(&self) -> StorageResult<()>;

    async fn get_bytes(&self, name: &str) -> StorageResult<Bytes> {
        let mut body = self.get(name).await?;
        let mut buf = Vec::with_capacity(body.object.size() as usize);
        body.reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn put_bytes(
        &self,
        name: &str,
        content_type: Option<String>,
        data: Bytes,
    ) -> StorageResult<Object> {
        let body = Box::pin(stream::once(async move { Ok::<_, io::Error>(data) }));
        self.put(name, content_type, body).await
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    fn bucket_name(&self) -> &str {
        StorageService::bucket_name(self)
    }

    /// Rows already carry their attributes, so every entry is `Ok`.
    async fn list(&self) -> StorageResult<Vec<ListedObject>> {
        let mut listed = Vec::new();
        let mut start_after = None;
        loop {
            let page = self
                .list_objects(ListObjectsParams {
                    start_after,
                    max_keys: MAX_LIST_KEYS,
                })
                .await?;
            listed.extend(page.objects.into_iter().map(|object| ListedObject {
                name: object.key.clone(),
                attrs: Ok(object),
            }));
            match page.next_start_after {
                Some(next) if page.is_truncated => start_after = Some(next),
                _ => return Ok(listed),
            }
        }
    }

    async fn attrs(&self, name: &str) -> StorageResult<Object> {
        self.get_object_metadata(name).await
    }

    async fn get(&self, name: &str) -> StorageResult<ObjectBody> {
        let (object, file) = self.get_object_reader(name).await?;
        Ok(ObjectBody {
            object,
            reader: Box::pin(file),
        })
    }

    async fn put(
        &self,
        name: &str,
        content_type: Option<String>,
        body: ByteStream,
    ) -> StorageResult<Object> {
        self.upload_object_stream(name, content_type, body).await
    }

    async fn ping(&self) -> StorageResult<()> {
        StorageService::ping(self).await
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory store with failure injection for tests.

    use super::*;
    use crate::services::storage_service::StorageError;
    use chrono::Utc;
    use futures::TryStreamExt;
    use std::{
        collections::{BTreeMap, HashSet},
        sync::Mutex,
    };
    use uuid::Uuid;

    #[derive(Default)]
    pub struct MemoryObjectStore {
        objects: Mutex<BTreeMap<String, (Object, Bytes)>>,
        failing_put_prefixes: Mutex<Vec<String>>,
        failing_attrs: Mutex<HashSet<String>>,
    }

    impl MemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, name: &str, data: impl Into<Bytes>) {
            let data = data.into();
            let object = Object {
                id: Uuid::new_v4(),
                key: name.to_string(),
                content_type: None,
                size_bytes: data.len() as i64,
                etag: Some(format!("{:x}", md5::compute(&data))),
                uploaded_at: Utc::now(),
            };
            self.objects
                .lock()
                .unwrap()
                .insert(name.to_string(), (object, data));
        }

        pub fn contains(&self, name: &str) -> bool {
            self.objects.lock().unwrap().contains_key(name)
        }

        pub fn bytes(&self, name: &str) -> Option<Bytes> {
            self.objects
                .lock()
                .unwrap()
                .get(name)
                .map(|(_, data)| data.clone())
        }

        /// Make every put under `prefix` fail with an I/O error.
        pub fn fail_puts_under(&self, prefix: &str) {
            self.failing_put_prefixes
                .lock()
                .unwrap()
                .push(prefix.to_string());
        }

        /// Make attribute lookups for `name` fail with an I/O error.
        pub fn fail_attrs_for(&self, name: &str) {
            self.failing_attrs.lock().unwrap().insert(name.to_string());
        }

        fn not_found(name: &str) -> StorageError {
            StorageError::ObjectNotFound {
                bucket: "memory".into(),
                key: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        fn bucket_name(&self) -> &str {
            "memory"
        }

        async fn list(&self) -> StorageResult<Vec<ListedObject>> {
            let names: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            let mut listed = Vec::with_capacity(names.len());
            for name in names {
                let attrs = self.attrs(&name).await;
                listed.push(ListedObject { name, attrs });
            }
            Ok(listed)
        }

        async fn attrs(&self, name: &str) -> StorageResult<Object> {
            if self.failing_attrs.lock().unwrap().contains(name) {
                return Err(StorageError::Io(io::Error::other("attrs unavailable")));
            }
            self.objects
                .lock()
                .unwrap()
                .get(name)
                .map(|(object, _)| object.clone())
                .ok_or_else(|| Self::not_found(name))
        }

        async fn get(&self, name: &str) -> StorageResult<ObjectBody> {
            let (object, data) = self
                .objects
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| Self::not_found(name))?;
            Ok(ObjectBody {
                object,
                reader: Box::pin(io::Cursor::new(data)),
            })
        }

        async fn put(
            &self,
            name: &str,
            content_type: Option<String>,
            body: ByteStream,
        ) -> StorageResult<Object> {
            let chunks: Vec<Bytes> = body.try_collect().await?;
            if self
                .failing_put_prefixes
                .lock()
                .unwrap()
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
            {
                return Err(StorageError::Io(io::Error::other("put rejected")));
            }
            self.insert(name, chunks.concat());
            let mut objects = self.objects.lock().unwrap();
            let (object, _) = objects
                .get_mut(name)
                .ok_or_else(|| Self::not_found(name))?;
            object.content_type = content_type;
            Ok(object.clone())
        }

        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }
    }
}
