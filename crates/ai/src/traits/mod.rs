mod image_caption;

use crate::HandlerPayload;
pub use image_caption::*;
use tokio::sync::{mpsc, oneshot};

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>>;

    fn batch_size_limit(&self) -> usize;
}

pub type BatchHandlerTx<Item, Output> = mpsc::Sender<HandlerPayload<Item, Output>>;

/// Handle to a model living on its own worker thread.
///
/// The model is constructed once on that thread and every request is
/// processed there one batch at a time, so callers never touch it
/// concurrently. Clones share the same worker; the model is released when
/// the last clone is dropped.
#[derive(Debug)]
pub struct AIModel<TItem, TOutput> {
    model_id: String, // for better logging
    tx: BatchHandlerTx<TItem, TOutput>,
}

impl<TItem, TOutput> Clone for AIModel<TItem, TOutput> {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<TItem, TOutput> AIModel<TItem, TOutput>
where
    TItem: Send + 'static,
    TOutput: Send + 'static,
{
    /// Spawns the worker and waits until `create_model` has finished on it.
    pub async fn new<T, TFn>(model_id: String, create_model: TFn) -> anyhow::Result<Self>
    where
        T: Model<Item = TItem, Output = TOutput> + 'static,
        TFn: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<HandlerPayload<TItem, TOutput>>(512);
        let (ready_tx, ready_rx) = oneshot::channel::<anyhow::Result<()>>();

        let worker_model_id = model_id.clone();
        std::thread::Builder::new()
            .name(format!("model-{}", model_id))
            .spawn(move || {
                tracing::debug!(model_id = %worker_model_id, "loading model");
                let mut model = match create_model() {
                    Ok(model) => {
                        let _ = ready_tx.send(Ok(()));
                        model
                    }
                    Err(e) => {
                        tracing::error!(model_id = %worker_model_id, "failed to load model: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Some((items, result_tx)) = rx.blocking_recv() {
                    // If channel closed,
                    // we have no way to response, just ignore task.
                    // This is very useful for task cancellation.
                    if result_tx.is_closed() {
                        tracing::debug!(model_id = %worker_model_id, "caller gone, skip items");
                        continue;
                    }

                    let results = model.process(items);

                    if result_tx.send(results).is_err() {
                        tracing::error!(model_id = %worker_model_id, "failed to send results");
                    }
                }

                // this means all tx has been dropped
                tracing::info!(model_id = %worker_model_id, "all handles dropped, release model");
            })?;

        match ready_rx.await {
            Ok(Ok(())) => {
                tracing::info!(model_id = %model_id, "model loaded");
            }
            Ok(Err(e)) => {
                return Err(e.context(format!("failed to load model {}", model_id)));
            }
            Err(_) => {
                anyhow::bail!("model worker for {} exited during load", model_id);
            }
        }

        Ok(Self { model_id, tx })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[tracing::instrument(name = "AIModel::process", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process(&self, items: Vec<TItem>) -> anyhow::Result<Vec<anyhow::Result<TOutput>>> {
        let (result_tx, rx) = oneshot::channel();
        match self.tx.send((items, result_tx)).await {
            Ok(_) => {
                tracing::debug!("items sent to model");
            }
            Err(_) => {
                anyhow::bail!("failed to send items: model worker stopped");
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => {
                anyhow::bail!("failed to receive results: {:?}", e);
            }
        }
    }

    #[tracing::instrument(name = "AIModel::process_single", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process_single(&self, item: TItem) -> anyhow::Result<TOutput> {
        let results = self.process(vec![item]).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or(anyhow::anyhow!("no result"))??;
        Ok(result)
    }
}
