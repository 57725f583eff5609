//! Observer registration per model type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::event_error::EventError;
use crate::events::ModelObserver;

/// Observers of one model type, in registration order
pub struct ObserverList<T> {
    observers: Vec<Arc<dyn ModelObserver<T>>>,
}

impl<T> ObserverList<T> {
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub async fn trigger_creating(&self, model: &mut T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.creating(model).await?;
        }
        Ok(())
    }

    pub async fn trigger_created(&self, model: &T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.created(model).await?;
        }
        Ok(())
    }

    pub async fn trigger_updating(&self, model: &mut T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.updating(model).await?;
        }
        Ok(())
    }

    pub async fn trigger_updated(&self, model: &T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.updated(model).await?;
        }
        Ok(())
    }

    pub async fn trigger_deleting(&self, model: &T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.deleting(model).await?;
        }
        Ok(())
    }

    pub async fn trigger_deleted(&self, model: &T) -> Result<(), EventError> {
        for observer in &self.observers {
            observer.deleted(model).await?;
        }
        Ok(())
    }
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<T> Clone for ObserverList<T> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

/// Observers for every model type, keyed by [`TypeId`]
#[derive(Default)]
pub struct ObserverRegistry {
    model_observers: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: 'static>(&self, observer: Arc<dyn ModelObserver<T>>) {
        let mut observers = self
            .model_observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = observers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ObserverList::<T>::default()));
        if let Some(list) = entry.downcast_mut::<ObserverList<T>>() {
            list.observers.push(observer);
        }
    }

    pub fn has_observers_for<T: 'static>(&self) -> bool {
        self.observers_for::<T>().observer_count() > 0
    }

    /// Snapshot of the observers registered for `T`.
    ///
    /// Returned by value so no lock is held while hooks run.
    pub fn observers_for<T: 'static>(&self) -> ObserverList<T> {
        let observers = self
            .model_observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        observers
            .get(&TypeId::of::<T>())
            .and_then(|list| list.downcast_ref::<ObserverList<T>>())
            .cloned()
            .unwrap_or_default()
    }
}
