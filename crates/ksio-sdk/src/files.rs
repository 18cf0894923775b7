use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use ksio_serializer::{KeyedSerializer, Pending, ReadResult, WriteResult};
use ksio_store::{FsBackend, StorageBackend};
use ksio_types::{Encoding, Key, OpError, TypeError};
use tracing::warn;

use crate::config::Config;
use crate::dispatch::CompletionDispatcher;
use crate::error::SdkResult;

/// Read/write entry points over a keyed serializer.
///
/// Every method submits its operation before returning, so the order of
/// calls on one key is the order the operations run in, no matter when the
/// returned futures are awaited. Futures are `'static` and may be moved to
/// other tasks. The `*_then` variants deliver the result to a callback
/// through the configured [`CompletionDispatcher`].
///
/// Failed operations are logged at `warn` level and still delivered.
pub struct SerialFiles<B, D> {
    serializer: KeyedSerializer<B>,
    dispatcher: Arc<D>,
    default_encoding: Encoding,
}

impl<D: CompletionDispatcher> SerialFiles<FsBackend, D> {
    /// Build a file-system backed instance from `config` on the current
    /// tokio runtime.
    pub fn open(config: &Config, dispatcher: D) -> SdkResult<Self> {
        let serializer = KeyedSerializer::new(Arc::new(config.backend()), config.serializer.clone())?;
        Ok(Self::new(serializer, dispatcher).with_default_encoding(config.text.default_encoding))
    }
}

impl<B: StorageBackend, D: CompletionDispatcher> SerialFiles<B, D> {
    pub fn new(serializer: KeyedSerializer<B>, dispatcher: D) -> Self {
        Self {
            serializer,
            dispatcher: Arc::new(dispatcher),
            default_encoding: Encoding::default(),
        }
    }

    /// Encoding used by [`read_string`](Self::read_string) and
    /// [`write_string`](Self::write_string).
    pub fn with_default_encoding(mut self, encoding: Encoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    pub fn serializer(&self) -> &KeyedSerializer<B> {
        &self.serializer
    }

    // ---- Future form ----

    /// Read every byte stored under `key`.
    pub fn read_bytes(
        &self,
        key: &str,
    ) -> SdkResult<impl Future<Output = ReadResult> + Send + 'static> {
        let pending = self.serializer.read(Key::new(key)?);
        Ok(async move { logged_read(pending.await) })
    }

    /// Read the text stored under `key`, decoded with `encoding`.
    pub fn read_text(
        &self,
        key: &str,
        encoding: Encoding,
    ) -> SdkResult<impl Future<Output = Result<String, OpError>> + Send + 'static> {
        let key = Key::new(key)?;
        let pending = self.serializer.read(key.clone());
        Ok(async move {
            let bytes = logged_read(pending.await)?;
            encoding.decode(&bytes).map_err(|e| {
                let err = codec_failure(key, e);
                warn!(key = %err.key(), error = %err, "text read failed");
                err
            })
        })
    }

    /// Read text with the default encoding.
    pub fn read_string(
        &self,
        key: &str,
    ) -> SdkResult<impl Future<Output = Result<String, OpError>> + Send + 'static> {
        self.read_text(key, self.default_encoding)
    }

    /// Replace the content under `key` with `bytes`.
    pub fn write_bytes(
        &self,
        key: &str,
        bytes: impl Into<Bytes>,
    ) -> SdkResult<impl Future<Output = WriteResult> + Send + 'static> {
        let pending = self.serializer.write(Key::new(key)?, bytes);
        Ok(async move { logged_write(pending.await) })
    }

    /// Replace the content under `key` with `text` encoded as `encoding`.
    ///
    /// Text that cannot be encoded fails the write without submitting it.
    pub fn write_text(
        &self,
        key: &str,
        text: &str,
        encoding: Encoding,
    ) -> SdkResult<impl Future<Output = WriteResult> + Send + 'static> {
        let key = Key::new(key)?;
        let pending = match encoding.encode(text) {
            Ok(bytes) => self.serializer.write(key, bytes),
            Err(e) => Pending::ready(
                key.clone(),
                WriteResult::failed(codec_failure(key, e)),
                |key| WriteResult::failed(OpError::Abandoned { key }),
            ),
        };
        Ok(async move { logged_write(pending.await) })
    }

    /// Write text with the default encoding.
    pub fn write_string(
        &self,
        key: &str,
        text: &str,
    ) -> SdkResult<impl Future<Output = WriteResult> + Send + 'static> {
        self.write_text(key, text, self.default_encoding)
    }

    // ---- Callback form ----

    pub fn read_bytes_then<F>(&self, key: &str, on_complete: F) -> SdkResult<()>
    where
        F: FnOnce(ReadResult) + Send + 'static,
    {
        let result = self.read_bytes(key)?;
        self.deliver(result, on_complete);
        Ok(())
    }

    pub fn read_text_then<F>(&self, key: &str, encoding: Encoding, on_complete: F) -> SdkResult<()>
    where
        F: FnOnce(Result<String, OpError>) + Send + 'static,
    {
        let result = self.read_text(key, encoding)?;
        self.deliver(result, on_complete);
        Ok(())
    }

    pub fn write_bytes_then<F>(
        &self,
        key: &str,
        bytes: impl Into<Bytes>,
        on_complete: F,
    ) -> SdkResult<()>
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        let result = self.write_bytes(key, bytes)?;
        self.deliver(result, on_complete);
        Ok(())
    }

    pub fn write_text_then<F>(
        &self,
        key: &str,
        text: &str,
        encoding: Encoding,
        on_complete: F,
    ) -> SdkResult<()>
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        let result = self.write_text(key, text, encoding)?;
        self.deliver(result, on_complete);
        Ok(())
    }

    /// Await `result` on the serializer's runtime, then hand it to
    /// `on_complete` through the dispatcher.
    fn deliver<T, Fut, F>(&self, result: Fut, on_complete: F)
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.serializer.handle().spawn(async move {
            let value = result.await;
            dispatcher.dispatch(Box::new(move || on_complete(value)));
        });
    }
}

impl<B, D> Clone for SerialFiles<B, D> {
    fn clone(&self) -> Self {
        Self {
            serializer: self.serializer.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            default_encoding: self.default_encoding,
        }
    }
}

fn codec_failure(key: Key, err: TypeError) -> OpError {
    OpError::EncodingFailure {
        key,
        reason: err.to_string(),
    }
}

fn logged_read(result: ReadResult) -> ReadResult {
    if let Err(err) = &result {
        warn!(key = %err.key(), error = %err, "read failed");
    }
    result
}

fn logged_write(result: WriteResult) -> WriteResult {
    if let Some(err) = &result.error {
        warn!(key = %err.key(), error = %err, "write failed");
    }
    result
}
