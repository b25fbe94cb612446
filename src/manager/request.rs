//! Request intake, deduplication and cancellation.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};
use crate::provider::{AssetProvider, FetchRequest, TransferSink};
use crate::transfer::Transfer;
use crate::types::{AssetId, AssetOutcome, AssetType, Event, RequestHandle, RequestId, RequestState};

use super::{ActiveTransfer, AssetManager, DeliveryTarget, Waiter};

impl AssetManager {
    /// Request an asset; `target` receives the outcome exactly once
    ///
    /// Returns immediately. If a transfer for `asset_id` is already in flight
    /// the request attaches to it and no new provider fetch is issued.
    /// Otherwise a transfer is created and the first provider (in
    /// `provider_order`) that supports `asset_type` is asked to fetch it.
    ///
    /// # Errors
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`Error::InvalidAssetId`] for the nil asset ID
    /// - [`Error::NoProvider`] if no provider serves `asset_type`
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use asset_transfer::{AssetManager, AssetOutcome};
    /// # use asset_transfer::types::{AssetId, AssetType, RequestId};
    /// # async fn example(manager: AssetManager, asset_id: AssetId) -> asset_transfer::Result<()> {
    /// let handle = manager
    ///     .request_asset(asset_id, AssetType::Sound, |request: RequestId, outcome: AssetOutcome| {
    ///         match outcome {
    ///             AssetOutcome::Completed(bytes) => println!("{request}: {} bytes", bytes.len()),
    ///             AssetOutcome::Failed(reason) => eprintln!("{request}: {reason}"),
    ///         }
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request_asset<T>(
        &self,
        asset_id: AssetId,
        asset_type: AssetType,
        target: T,
    ) -> Result<RequestHandle>
    where
        T: DeliveryTarget,
    {
        if !self.shared.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if asset_id.is_nil() {
            return Err(Error::InvalidAssetId(asset_id.to_string()));
        }

        let request = RequestId(self.shared.next_request_id.fetch_add(1, Ordering::SeqCst));
        let target: Box<dyn DeliveryTarget> = Box::new(target);

        let mut table = self.shared.table.lock().await;

        // shutdown flips the flag before draining under this lock
        if !self.shared.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if let Some(active) = table.transfers.get_mut(&asset_id) {
            if active.transfer.asset_type() != asset_type {
                tracing::debug!(
                    %asset_id,
                    requested = %asset_type,
                    in_flight = %active.transfer.asset_type(),
                    "Attaching to transfer started with a different asset type"
                );
            }

            let initial = if active.issued {
                RequestState::InFlight
            } else {
                RequestState::Pending
            };
            let (state, rx) = watch::channel(initial);
            active.waiters.push(Waiter {
                request,
                target,
                state,
            });
            let waiters = active.waiters.len();
            table.requests.insert(request, asset_id);
            drop(table);

            tracing::debug!(%asset_id, %request, waiters, "Request attached to in-flight transfer");
            self.emit_event(Event::RequestAttached { asset_id, request });

            return Ok(RequestHandle {
                id: request,
                asset_id,
                state: rx,
            });
        }

        let provider = self.select_provider(asset_type).ok_or(Error::NoProvider {
            asset_id,
            asset_type,
        })?;

        let generation = table.next_generation;
        table.next_generation += 1;

        let (state, rx) = watch::channel(RequestState::Pending);
        table.transfers.insert(
            asset_id,
            ActiveTransfer {
                transfer: Transfer::new(asset_id, asset_type),
                generation,
                provider: provider.clone(),
                retries: 0,
                issued: false,
                waiters: vec![Waiter {
                    request,
                    target,
                    state,
                }],
            },
        );
        table.requests.insert(request, asset_id);
        drop(table);

        tracing::info!(
            %asset_id,
            %asset_type,
            %request,
            provider = provider.name(),
            "Starting asset transfer"
        );
        self.emit_event(Event::TransferStarted {
            asset_id,
            provider: provider.name().to_string(),
            request,
        });

        self.issue_fetch(
            provider,
            FetchRequest {
                asset_id,
                asset_type,
                attempt: 0,
            },
            generation,
        );

        Ok(RequestHandle {
            id: request,
            asset_id,
            state: rx,
        })
    }

    /// Request an asset and receive the outcome on a oneshot channel
    ///
    /// The receiver errors if the request is cancelled.
    pub async fn fetch(
        &self,
        asset_id: AssetId,
        asset_type: AssetType,
    ) -> Result<(RequestHandle, oneshot::Receiver<AssetOutcome>)> {
        let (tx, rx) = oneshot::channel();
        let target = move |_request: RequestId, outcome: AssetOutcome| {
            tx.send(outcome).ok();
        };
        let handle = self.request_asset(asset_id, asset_type, target).await?;
        Ok((handle, rx))
    }

    /// Detach a request from its transfer
    ///
    /// The target is dropped without being called. If it was the last
    /// target, the transfer is destroyed and late provider events for it are
    /// discarded. The provider's in-flight I/O is not interrupted.
    ///
    /// # Errors
    /// Returns [`Error::RequestNotFound`] if the request already finished,
    /// was cancelled before, or never existed.
    pub async fn cancel_request(&self, request: RequestId) -> Result<()> {
        let mut table = self.shared.table.lock().await;

        let asset_id = table
            .requests
            .remove(&request)
            .ok_or(Error::RequestNotFound(request))?;
        let active = table
            .transfers
            .get_mut(&asset_id)
            .ok_or(Error::RequestNotFound(request))?;

        if let Some(pos) = active.waiters.iter().position(|w| w.request == request) {
            let waiter = active.waiters.remove(pos);
            waiter.state.send_replace(RequestState::Cancelled);
        }

        let abandoned = active.waiters.is_empty();
        if abandoned {
            table.retire(asset_id);
        }
        drop(table);

        tracing::info!(%asset_id, %request, abandoned, "Request cancelled");
        if abandoned {
            self.emit_event(Event::Cancelled { asset_id });
        }
        Ok(())
    }

    /// Hand a fetch to the provider on its own task
    pub(crate) fn issue_fetch(
        &self,
        provider: Arc<dyn AssetProvider>,
        request: FetchRequest,
        generation: u64,
    ) {
        let sink = TransferSink::new(Arc::downgrade(&self.shared), request.asset_id, generation);

        tokio::spawn(async move {
            sink.mark_in_flight().await;

            let asset_id = request.asset_id;
            let attempt = request.attempt;
            if let Err(e) = provider.fetch(request, sink.clone()).await {
                tracing::error!(
                    %asset_id,
                    provider = provider.name(),
                    attempt,
                    error = %e,
                    "Asset fetch failed"
                );
                sink.fail(e.to_string()).await;
            }
        });
    }
}
