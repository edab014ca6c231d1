//! High-level EventDBX client.
//!
//! [`ControlClient`] is the seam between the facade and the wire: it exposes
//! one method per control verb with typed inputs and outputs.
//! [`ControlSession`] implements it over a real socket; tests substitute
//! their own implementation.
//!
//! [`EventDbxClient`] adds the caller-facing conveniences on top: optional
//! option arguments, a terminal `close()`, and closing on drop.
//!
//! ```no_run
//! use eventdbx_client::{ClientConfig, EventDbxClient};
//!
//! let config = ClientConfig::builder().token("secret").build()?;
//! let mut client = EventDbxClient::new(config);
//! let snapshot = client.get("person", "p-1")?;
//! # Ok::<(), eventdbx_client::ClientError>(())
//! ```
use serde_json::Value;

use crate::{
    config::ClientConfig,
    error::{ClientError, ClientResult},
    model::{AggregateSnapshot, Endpoint, EventRecord, JsonPatchOperation, Page},
    options::{AppendOptions, ArchiveOptions, CreateOptions, PageOptions, PatchOptions},
    protocol::{ControlSession, verbs},
};

pub trait ControlClient {
    fn connect(&mut self) -> ClientResult<()>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn endpoint(&self) -> Endpoint;

    fn list(&mut self, options: &PageOptions) -> ClientResult<Page<AggregateSnapshot>>;

    fn get(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> ClientResult<Option<AggregateSnapshot>>;

    fn select(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        fields: &[String],
    ) -> ClientResult<Option<Value>>;

    fn events(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: &PageOptions,
    ) -> ClientResult<Page<EventRecord>>;

    fn append(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: &AppendOptions,
    ) -> ClientResult<EventRecord>;

    fn create(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: &CreateOptions,
    ) -> ClientResult<AggregateSnapshot>;

    fn patch(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        operations: &[JsonPatchOperation],
        options: &PatchOptions,
    ) -> ClientResult<AggregateSnapshot>;

    fn set_archived(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        archived: bool,
        options: &ArchiveOptions,
    ) -> ClientResult<AggregateSnapshot>;
}

impl ControlClient for ControlSession {
    fn connect(&mut self) -> ClientResult<()> {
        ControlSession::connect(self)
    }

    fn disconnect(&mut self) {
        ControlSession::disconnect(self)
    }

    fn is_connected(&self) -> bool {
        ControlSession::is_connected(self)
    }

    fn endpoint(&self) -> Endpoint {
        ControlSession::endpoint(self)
    }

    fn list(&mut self, options: &PageOptions) -> ClientResult<Page<AggregateSnapshot>> {
        let request = verbs::list_request(options, self.config().token());
        verbs::parse_list(self.send_request(request)?)
    }

    fn get(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> ClientResult<Option<AggregateSnapshot>> {
        let request = verbs::get_request(aggregate_type, aggregate_id, self.config().token());
        verbs::parse_get(self.send_request(request)?)
    }

    fn select(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        fields: &[String],
    ) -> ClientResult<Option<Value>> {
        let request =
            verbs::select_request(aggregate_type, aggregate_id, fields, self.config().token());
        verbs::parse_select(self.send_request(request)?)
    }

    fn events(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: &PageOptions,
    ) -> ClientResult<Page<EventRecord>> {
        let request =
            verbs::events_request(aggregate_type, aggregate_id, options, self.config().token());
        verbs::parse_events(self.send_request(request)?)
    }

    fn append(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: &AppendOptions,
    ) -> ClientResult<EventRecord> {
        let request = verbs::append_request(
            aggregate_type,
            aggregate_id,
            event_type,
            options,
            self.config().token(),
        );
        verbs::parse_append(self.send_request(request)?)
    }

    fn create(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: &CreateOptions,
    ) -> ClientResult<AggregateSnapshot> {
        let request = verbs::create_request(
            aggregate_type,
            aggregate_id,
            event_type,
            options,
            self.config().token(),
        );
        verbs::parse_create(self.send_request(request)?)
    }

    fn patch(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        operations: &[JsonPatchOperation],
        options: &PatchOptions,
    ) -> ClientResult<AggregateSnapshot> {
        let request = verbs::patch_request(
            aggregate_type,
            aggregate_id,
            event_type,
            operations,
            options,
            self.config().token(),
        )?;
        verbs::parse_patch(self.send_request(request)?)
    }

    fn set_archived(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        archived: bool,
        options: &ArchiveOptions,
    ) -> ClientResult<AggregateSnapshot> {
        let request = verbs::archive_request(
            aggregate_type,
            aggregate_id,
            archived,
            options,
            self.config().token(),
        );
        verbs::parse_archive(self.send_request(request)?)
    }
}

/// Caller-facing client. Connects lazily on the first operation.
pub struct EventDbxClient<C: ControlClient = ControlSession> {
    control: C,
    closed: bool,
}

impl EventDbxClient<ControlSession> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_control(ControlSession::new(config))
    }
}

impl<C: ControlClient> EventDbxClient<C> {
    pub fn with_control(control: C) -> Self {
        Self {
            control,
            closed: false,
        }
    }

    fn open(&mut self) -> ClientResult<&mut C> {
        if self.closed {
            return Err(ClientError::ClientClosed);
        }
        Ok(&mut self.control)
    }

    pub fn connect(&mut self) -> ClientResult<()> {
        self.open()?.connect()
    }

    /// Drops the connection; the next operation reconnects.
    pub fn disconnect(&mut self) {
        self.control.disconnect();
    }

    /// Disconnects for good. Every later operation fails with
    /// [`ClientError::ClientClosed`].
    pub fn close(&mut self) {
        if !self.closed {
            self.control.disconnect();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_connected(&self) -> bool {
        !self.closed && self.control.is_connected()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.control.endpoint()
    }

    pub fn list(&mut self, options: Option<PageOptions>) -> ClientResult<Page<AggregateSnapshot>> {
        self.open()?.list(&options.unwrap_or_default())
    }

    pub fn get(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> ClientResult<Option<AggregateSnapshot>> {
        self.open()?.get(aggregate_type, aggregate_id)
    }

    pub fn select(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        fields: &[String],
    ) -> ClientResult<Option<Value>> {
        self.open()?.select(aggregate_type, aggregate_id, fields)
    }

    pub fn events(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<PageOptions>,
    ) -> ClientResult<Page<EventRecord>> {
        self.open()?
            .events(aggregate_type, aggregate_id, &options.unwrap_or_default())
    }

    pub fn append(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: Option<AppendOptions>,
    ) -> ClientResult<EventRecord> {
        self.open()?.append(
            aggregate_type,
            aggregate_id,
            event_type,
            &options.unwrap_or_default(),
        )
    }

    pub fn create(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: Option<CreateOptions>,
    ) -> ClientResult<AggregateSnapshot> {
        self.open()?.create(
            aggregate_type,
            aggregate_id,
            event_type,
            &options.unwrap_or_default(),
        )
    }

    pub fn patch(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        operations: &[JsonPatchOperation],
        options: Option<PatchOptions>,
    ) -> ClientResult<AggregateSnapshot> {
        self.open()?.patch(
            aggregate_type,
            aggregate_id,
            event_type,
            operations,
            &options.unwrap_or_default(),
        )
    }

    pub fn archive(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<ArchiveOptions>,
    ) -> ClientResult<AggregateSnapshot> {
        self.open()?
            .set_archived(aggregate_type, aggregate_id, true, &options.unwrap_or_default())
    }

    pub fn restore(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<ArchiveOptions>,
    ) -> ClientResult<AggregateSnapshot> {
        self.open()?
            .set_archived(aggregate_type, aggregate_id, false, &options.unwrap_or_default())
    }
}

impl<C: ControlClient> Drop for EventDbxClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}
