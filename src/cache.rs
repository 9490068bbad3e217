//! Fitted-model cache for callers that refit the same panel repeatedly.
//!
//! The estimation core never consults this; callers key it explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::panel::TimeSeriesPanel;
use crate::types::{LagOrder, VarError};
use crate::var::{fit_var, FittedVarModel};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub panel: u64,
    pub variables: Vec<String>,
    pub lag_order: LagOrder,
}

impl ModelKey {
    pub fn for_panel(panel: &TimeSeriesPanel, lag_order: LagOrder) -> Self {
        Self {
            panel: panel.fingerprint(),
            variables: panel.variables().to_vec(),
            lag_order,
        }
    }
}

#[derive(Default)]
pub struct ModelCache {
    models: RwLock<HashMap<ModelKey, Arc<FittedVarModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ModelKey) -> Option<Arc<FittedVarModel>> {
        self.models.read().get(key).cloned()
    }

    /// Cached model for `(panel, lag_order)`, fitting and storing it on a miss.
    ///
    /// Two threads missing at once may both fit; the first insert wins.
    pub fn get_or_fit(
        &self,
        panel: &TimeSeriesPanel,
        lag_order: LagOrder,
    ) -> Result<Arc<FittedVarModel>, VarError> {
        let key = ModelKey::for_panel(panel, lag_order);
        if let Some(model) = self.get(&key) {
            debug!(lag_order, "model cache hit");
            return Ok(model);
        }
        let fitted = Arc::new(fit_var(panel, lag_order)?);
        let mut models = self.models.write();
        Ok(models.entry(key).or_insert(fitted).clone())
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.models.write().clear();
    }
}
