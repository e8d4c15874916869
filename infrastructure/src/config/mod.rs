//! Configuration: file format and multi-source loader

pub mod file_config;
pub mod loader;

pub use file_config::{
    ConfigValidationError, FileBrowserConfig, FileConfig, FileProviderConfig, FileServerConfig,
    FileStoreConfig, FileToolConfig,
};
pub use loader::ConfigLoader;
