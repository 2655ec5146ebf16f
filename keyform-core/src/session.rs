//! Connection-scoped model registry.
//!
//! A [`Session`] owns a connected store handle and every model defined
//! against it. There is no hidden global registry: models exist only inside
//! the session that defined them, and handles borrow the session's store.
//!
//! Definition is synchronous — configuration problems (empty names, bad
//! templates) surface before any asynchronous store work. The one
//! store-facing responsibility a session carries is [`Session::provision`],
//! the schema-upgrade-phase step that creates collections and secondary
//! indexes.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use log::debug;

use crate::{
    error::{KeyformError, KeyformResult},
    model::{Model, ModelState},
    schema::Schema,
    store::{KeyedStore, Record},
};

/// Default primary-key field for defined models.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Owns a store handle and the models defined against it.
#[derive(Debug)]
pub struct Session<B: KeyedStore> {
    store: B,
    models: RwLock<HashMap<String, Arc<ModelState>>>,
}

impl<B: KeyedStore> Session<B> {
    /// Creates a session over a connected store handle.
    pub fn new(store: B) -> Self {
        Self {
            store,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &B {
        &self.store
    }

    /// Defines a model keyed by [`DEFAULT_KEY_FIELD`]. See
    /// [`Session::define_keyed`].
    pub fn define(&self, name: &str, template: &Record) -> KeyformResult<Model<'_, B>> {
        self.define_keyed(name, template, DEFAULT_KEY_FIELD)
    }

    /// Compiles `template` and registers a model under `name`, keyed by
    /// `key_field`. A model is defined once per logical name; the returned
    /// handle (and any later [`Session::model`] lookup) shares its state.
    ///
    /// # Errors
    ///
    /// [`KeyformError::Configuration`] for an empty name or key field, a
    /// template that fails to compile, or a name that is already defined.
    pub fn define_keyed(
        &self,
        name: &str,
        template: &Record,
        key_field: &str,
    ) -> KeyformResult<Model<'_, B>> {
        if name.is_empty() {
            return Err(KeyformError::Configuration(
                "model name must not be empty".to_string(),
            ));
        }
        if key_field.is_empty() {
            return Err(KeyformError::Configuration(format!(
                "model '{name}' needs a non-empty key field"
            )));
        }
        if template.is_empty() {
            return Err(KeyformError::Configuration(format!(
                "model '{name}' needs a non-empty schema template"
            )));
        }

        let schema = Schema::compile(template)?;
        let state = Arc::new(ModelState::new(
            name.to_string(),
            key_field.to_string(),
            schema,
        ));

        let mut models = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(name) {
            return Err(KeyformError::Configuration(format!(
                "model '{name}' is already defined"
            )));
        }
        models.insert(name.to_string(), Arc::clone(&state));
        debug!("defined model '{name}'");

        Ok(Model::new(state, &self.store))
    }

    /// Looks up a previously defined model.
    ///
    /// # Errors
    ///
    /// [`KeyformError::Configuration`] when no model of that name exists.
    pub fn model(&self, name: &str) -> KeyformResult<Model<'_, B>> {
        let models = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        models
            .get(name)
            .map(|state| Model::new(Arc::clone(state), &self.store))
            .ok_or_else(|| {
                KeyformError::Configuration(format!("model '{name}' is not defined"))
            })
    }

    /// Runs the schema-upgrade phase for every defined model: one collection
    /// plus one secondary index per schema leaf, unique where declared.
    ///
    /// Executed once after the store connects, not per operation.
    pub async fn provision(&self) -> KeyformResult<()> {
        let states: Vec<Arc<ModelState>> = {
            let models = self
                .models
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            models.values().map(Arc::clone).collect()
        };

        for state in states {
            self.store
                .create_collection(&state.collection, &state.key_field)
                .await?;
            for spec in state.schema.index_paths() {
                self.store
                    .create_index(&state.collection, &spec.path, spec.unique)
                    .await?;
            }
            debug!("provisioned collection {}", state.collection);
        }
        Ok(())
    }
}
