pub mod app;
pub mod bag_path;
pub mod bagit;
pub mod checksum;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod portal;
pub mod provenance;
