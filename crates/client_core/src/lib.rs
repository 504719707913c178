//! Client core of the club content manager: repository gateways over the hosted backend, the
//! list controller behind every admin screen, and the record form that feeds it.

pub mod config;
pub mod form;
pub mod gateway;
pub mod list_controller;
pub mod memory;
pub mod repositories;
pub mod rest;

pub use config::{load_settings, load_settings_from, ClientSettings};
pub use form::{required_fields, FormError, FormMode, RecordForm};
pub use gateway::{CollectionGateway, Diagnostics, RecordBackend, RepositoryGateway};
pub use list_controller::{
    DeleteOutcome, ListController, ListControllerBuilder, ListState, ReloadHandle, UserDialog,
};
pub use memory::InMemoryBackend;
pub use repositories::{
    Entity, Matches, News, Players, Repository, ShopCategories, ShopItems, Teams,
};
pub use rest::RestBackend;
