//! etcd v3 gRPC backend.
//!
//! Calls go through `tonic::client::Grpc` with a prost codec and hand-declared
//! messages, so no protoc step is needed. Keep-alive and watch are bidi
//! streams driven by background tasks that end when the caller drops the
//! returned stream.

pub mod errors;
pub mod proto;

use crate::core::config::StoreConfig;
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::net::tls::ClientTlsMaterial;
use crate::store::{
    KeepAliveAck, KeepAliveStream, KeyRange, LeaseGrant, RangeResult, Store, Txn, TxnResult,
    WatchStream,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use errors::{lease_status_to_error, status_to_error};
use futures::Stream;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::Streaming;

const KV_RANGE: &str = "/etcdserverpb.KV/Range";
const KV_PUT: &str = "/etcdserverpb.KV/Put";
const KV_DELETE_RANGE: &str = "/etcdserverpb.KV/DeleteRange";
const KV_TXN: &str = "/etcdserverpb.KV/Txn";
const LEASE_GRANT: &str = "/etcdserverpb.Lease/LeaseGrant";
const LEASE_REVOKE: &str = "/etcdserverpb.Lease/LeaseRevoke";
const LEASE_KEEPALIVE: &str = "/etcdserverpb.Lease/LeaseKeepAlive";
const LEASE_TIME_TO_LIVE: &str = "/etcdserverpb.Lease/LeaseTimeToLive";
const WATCH: &str = "/etcdserverpb.Watch/Watch";

/// Buffered keep-alive acknowledgements per stream.
const KEEPALIVE_BUFFER: usize = 16;

/// Floor on the renewal period.
const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);

/// etcd store reached over gRPC.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    channel: Channel,
}

impl EtcdStore {
    /// Connect to the configured endpoints.
    ///
    /// A single endpoint is dialled eagerly so an unreachable store fails
    /// here. Several endpoints are load balanced and connect lazily.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let tls = config
            .tls
            .as_ref()
            .map(ClientTlsMaterial::load)
            .transpose()?
            .map(|material| material.to_client_config());

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for url in &config.endpoints {
            let mut endpoint = Endpoint::from_shared(url.clone())
                .with_context(|| format!("invalid store endpoint: {}", url))?
                .connect_timeout(config.dial_timeout())
                .tcp_nodelay(true);
            if let Some(tls) = &tls {
                endpoint = endpoint
                    .tls_config(tls.clone())
                    .with_context(|| format!("invalid TLS config for endpoint: {}", url))?;
            }
            endpoints.push(endpoint);
        }

        let channel = match endpoints.len() {
            0 => anyhow::bail!("store.endpoints must not be empty"),
            1 => {
                let endpoint = endpoints.remove(0);
                endpoint
                    .connect()
                    .await
                    .with_context(|| format!("failed to connect to {}", endpoint.uri()))?
            }
            _ => Channel::balance_list(endpoints.into_iter()),
        };

        tracing::info!(endpoints = ?config.endpoints, tls = tls.is_some(), "connected to etcd");
        Ok(Self { channel })
    }

    /// Wrap an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    async fn grpc(&self) -> Result<tonic::client::Grpc<Channel>, tonic::Status> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("service not ready: {}", e)))?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc().await?;
        let codec = ProstCodec::<Req, Resp>::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    async fn streaming<Req, Resp>(
        &self,
        operation: &'static str,
        path: &'static str,
        outbound: mpsc::Receiver<Req>,
    ) -> LeaseholdResult<Streaming<Resp>>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self
            .grpc()
            .await
            .map_err(|status| status_to_error(operation, &status))?;
        let codec = ProstCodec::<Req, Resp>::default();
        let response = grpc
            .streaming(
                tonic::Request::new(request_stream(outbound)),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map_err(|status| status_to_error(operation, &status))?;
        Ok(response.into_inner())
    }
}

/// Turn a channel receiver into an outbound request stream.
fn request_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> impl Stream<Item = T> + Send + 'static {
    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}

fn keepalive_interval(ttl_seconds: i64) -> Duration {
    let ttl = Duration::from_secs(ttl_seconds.max(1) as u64);
    (ttl / 3).max(MIN_KEEPALIVE_INTERVAL)
}

#[async_trait]
impl Store for EtcdStore {
    async fn range(&self, range: KeyRange) -> LeaseholdResult<RangeResult> {
        let request = proto::RangeRequest {
            key: range.key,
            range_end: range.range_end,
            limit: 0,
        };
        let response: proto::RangeResponse = self
            .unary(KV_RANGE, request)
            .await
            .map_err(|s| status_to_error("range", &s))?;

        Ok(RangeResult {
            revision: proto::header_revision(&response.header),
            kvs: response.kvs.into_iter().map(Into::into).collect(),
        })
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>, lease: i64) -> LeaseholdResult<i64> {
        let request = proto::PutRequest {
            key,
            value,
            lease,
            prev_kv: false,
        };
        let response: proto::PutResponse = self
            .unary(KV_PUT, request)
            .await
            .map_err(|s| lease_status_to_error("put", lease, &s))?;
        Ok(proto::header_revision(&response.header))
    }

    async fn delete_range(&self, range: KeyRange) -> LeaseholdResult<i64> {
        let request = proto::DeleteRangeRequest {
            key: range.key,
            range_end: range.range_end,
            prev_kv: false,
        };
        let response: proto::DeleteRangeResponse = self
            .unary(KV_DELETE_RANGE, request)
            .await
            .map_err(|s| status_to_error("delete_range", &s))?;
        Ok(response.deleted)
    }

    async fn txn(&self, txn: Txn) -> LeaseholdResult<TxnResult> {
        let request = proto::TxnRequest::from(txn);
        let response: proto::TxnResponse = self
            .unary(KV_TXN, request)
            .await
            .map_err(|s| status_to_error("txn", &s))?;

        Ok(TxnResult {
            succeeded: response.succeeded,
            revision: proto::header_revision(&response.header),
            responses: response
                .responses
                .into_iter()
                .map(proto::ResponseOp::into_result)
                .collect(),
        })
    }

    async fn lease_grant(&self, ttl_seconds: i64) -> LeaseholdResult<LeaseGrant> {
        let request = proto::LeaseGrantRequest {
            ttl: ttl_seconds,
            id: 0,
        };
        let response: proto::LeaseGrantResponse = self
            .unary(LEASE_GRANT, request)
            .await
            .map_err(|s| match status_to_error("lease_grant", &s) {
                err if err.is_retriable() => err,
                _ => LeaseholdError::LeaseGrantFailed {
                    ttl_seconds,
                    message: s.message().to_string(),
                },
            })?;

        if !response.error.is_empty() {
            return Err(LeaseholdError::LeaseGrantFailed {
                ttl_seconds,
                message: response.error,
            });
        }

        Ok(LeaseGrant {
            id: response.id,
            ttl_seconds: response.ttl,
        })
    }

    async fn lease_revoke(&self, lease_id: i64) -> LeaseholdResult<()> {
        let _: proto::LeaseRevokeResponse = self
            .unary(LEASE_REVOKE, proto::LeaseRevokeRequest { id: lease_id })
            .await
            .map_err(|s| lease_status_to_error("lease_revoke", lease_id, &s))?;
        Ok(())
    }

    async fn lease_time_to_live(&self, lease_id: i64) -> LeaseholdResult<Option<i64>> {
        let request = proto::LeaseTimeToLiveRequest {
            id: lease_id,
            keys: false,
        };
        let result: Result<proto::LeaseTimeToLiveResponse, _> =
            self.unary(LEASE_TIME_TO_LIVE, request).await;

        match result {
            Ok(response) if response.ttl < 0 => Ok(None),
            Ok(response) => Ok(Some(response.ttl)),
            Err(status) => match lease_status_to_error("lease_time_to_live", lease_id, &status) {
                LeaseholdError::LeaseNotFound { .. } => Ok(None),
                err => Err(err),
            },
        }
    }

    async fn lease_keep_alive(&self, lease_id: i64) -> LeaseholdResult<KeepAliveStream> {
        let (req_tx, req_rx) = mpsc::channel(1);
        // etcd sends response headers with the first message; queue a request
        // before opening the stream.
        req_tx
            .send(proto::LeaseKeepAliveRequest { id: lease_id })
            .await
            .map_err(|_| LeaseholdError::unavailable("lease_keep_alive", "request channel closed"))?;

        let mut inbound: Streaming<proto::LeaseKeepAliveResponse> = self
            .streaming("lease_keep_alive", LEASE_KEEPALIVE, req_rx)
            .await?;
        let (ack_tx, ack_rx) = mpsc::channel(KEEPALIVE_BUFFER);

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    message = inbound.message() => message,
                    _ = ack_tx.closed() => break,
                };

                let response = match message {
                    Ok(Some(response)) => response,
                    Ok(None) => {
                        tracing::debug!(lease_id, "keep-alive stream closed by store");
                        break;
                    }
                    Err(status) => {
                        tracing::warn!(lease_id, error = %status, "keep-alive stream failed");
                        break;
                    }
                };

                if response.ttl <= 0 {
                    tracing::debug!(lease_id, "lease no longer exists");
                    break;
                }

                let ack = KeepAliveAck {
                    lease_id,
                    ttl_seconds: response.ttl,
                };
                if ack_tx.send(ack).await.is_err() {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(keepalive_interval(response.ttl)) => {}
                    _ = ack_tx.closed() => break,
                }
                if req_tx
                    .send(proto::LeaseKeepAliveRequest { id: lease_id })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(KeepAliveStream::new(ack_rx))
    }

    async fn watch(&self, range: KeyRange) -> LeaseholdResult<WatchStream> {
        let (req_tx, req_rx) = mpsc::channel(1);
        let create = proto::WatchRequest {
            request_union: Some(proto::watch_request::RequestUnion::CreateRequest(
                proto::WatchCreateRequest {
                    key: range.key,
                    range_end: range.range_end,
                    ..proto::WatchCreateRequest::default()
                },
            )),
        };
        req_tx
            .send(create)
            .await
            .map_err(|_| LeaseholdError::unavailable("watch", "request channel closed"))?;

        let mut inbound: Streaming<proto::WatchResponse> =
            self.streaming("watch", WATCH, req_rx).await?;

        match inbound.message().await {
            Ok(Some(response)) if response.created && !response.canceled => {}
            Ok(Some(response)) => {
                return Err(LeaseholdError::rejected("watch", response.cancel_reason));
            }
            Ok(None) => {
                return Err(LeaseholdError::unavailable("watch", "stream closed before creation"));
            }
            Err(status) => return Err(status_to_error("watch", &status)),
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            // Closing the outbound half ends the watch on the server.
            let _req_tx = req_tx;
            loop {
                let message = tokio::select! {
                    message = inbound.message() => message,
                    _ = event_tx.closed() => break,
                };

                match message {
                    Ok(Some(response)) => {
                        for event in response.events {
                            if event_tx.send(event.into()).is_err() {
                                return;
                            }
                        }
                        if response.canceled {
                            tracing::warn!(
                                watch_id = response.watch_id,
                                reason = %response.cancel_reason,
                                "watch canceled by store"
                            );
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        tracing::warn!(error = %status, "watch stream failed");
                        break;
                    }
                }
            }
        });

        Ok(WatchStream::new(event_rx))
    }
}
