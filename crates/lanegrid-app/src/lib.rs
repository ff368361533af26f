// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod catalog;
pub mod editability;
pub mod editor;
pub mod ids;
pub mod schema;
pub mod state;
pub mod value;
pub mod view_model;

pub use catalog::*;
pub use editability::*;
pub use editor::*;
pub use ids::*;
pub use schema::*;
pub use state::*;
pub use value::*;
pub use view_model::*;
