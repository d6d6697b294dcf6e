//! lampviz: lamp product configurator and scene editor.
//!
//! The storefront resolves a finish [`config::Configuration`] to a render
//! image path and restyles the 3D lamp to match. The editor exposes the same
//! scene through a hierarchy, an inspector and a transform gizmo. Both draw
//! through [`render::BloomRenderer`], which makes only the pattern glow.

pub mod app;
pub mod assets;
pub mod config;
pub mod configurator;
pub mod editor;
pub mod render;
pub mod scene;
pub mod ui;
