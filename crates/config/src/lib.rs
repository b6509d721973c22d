// Configuration loading

pub mod settings;

pub use settings::{
    AttributeNames, ScrollBehavior, ScrollBlock, ScrollOptions, Settings, SettingsError,
};
