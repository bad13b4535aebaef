//! Alert sources feeding the polling loop.
//!
//! Provider HTTP clients live outside this crate; they hand over normalized
//! alerts through `AlertSource`. `JsonFileSource` reads a feed file dropped
//! on disk by such a collaborator.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use super::error::{AlertError, AlertResult};
use super::model::{WeatherAlert, WeatherAlerts};

pub trait AlertSource: Send + Sync {
    fn fetch(&self) -> AlertResult<WeatherAlerts>;
}

/// Either `{"alerts": [...]}` or a bare array of alerts.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    Bare(Vec<WeatherAlert>),
    Wrapped(WeatherAlerts),
}

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSource for JsonFileSource {
    fn fetch(&self) -> AlertResult<WeatherAlerts> {
        if !self.path.exists() {
            debug!("Alert feed {:?} not present; treating as empty", self.path);
            return Ok(WeatherAlerts::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let document: FeedDocument = serde_json::from_str(&content)
            .map_err(|e| AlertError::Source(format!("{}: {}", self.path.display(), e)))?;
        Ok(match document {
            FeedDocument::Bare(alerts) => WeatherAlerts::new(alerts),
            FeedDocument::Wrapped(alerts) => alerts,
        })
    }
}
