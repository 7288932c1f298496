use std::{error::Error, fs};

use ron::{extensions::Extensions, Options};
use serde::{Deserialize, Serialize};

use crate::packet::BodyType;

#[derive(Debug, Deserialize, Serialize)]
pub struct AuroraConfig {
    pub version: f32,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the database file
    pub path: String,
    /// Database name, becomes `<path>/<database>.sqlite`
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".".to_string(),
            database: "SRAM".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn file(&self) -> String {
        format!("{}/{}.sqlite", self.path, self.database)
    }
}

/// Where each record kind lands. References always go to the fixed
/// `references` collection, only sample/header naming is configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionsConfig {
    pub headers: String,
    pub memory: String,
    pub sensors: String,
    pub code: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            headers: "headers".to_string(),
            memory: "memory".to_string(),
            sensors: "sensors".to_string(),
            code: "code".to_string(),
        }
    }
}

impl CollectionsConfig {
    /// Sample collection for a body type
    pub fn for_body(&self, kind: BodyType) -> &str {
        match kind {
            BodyType::Memory => &self.memory,
            BodyType::Sensors => &self.sensors,
            BodyType::Code => &self.code,
        }
    }
}

impl AuroraConfig {
    pub fn from_file(file_path: &str) -> Result<Self, Box<dyn Error>> {
        Self::parse(&fs::read_to_string(file_path)?)
    }

    pub fn parse(s: &str) -> Result<Self, Box<dyn Error>> {
        let options = Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES);
        Ok(options.from_str(s)?)
    }
}
