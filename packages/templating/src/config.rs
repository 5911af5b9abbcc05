//! Engine Configuration
//!
//! Options applied when a `ViewEngine` is constructed. Loadable from JSON
//! so hosts and the CLI can share one configuration file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::view_factory::CacheSize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// File extension -> loader plugin used for `<require>` of that extension
    pub resource_plugins: IndexMap<String, String>,
    /// Cache size given to loaded view factories that did not configure one
    pub default_cache_size: Option<CacheSize>,
    /// Compile `<template>` root attributes into surrogate instructions
    pub compile_surrogates: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig {
            resource_plugins: IndexMap::new(),
            default_cache_size: None,
            compile_surrogates: true,
        }
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
