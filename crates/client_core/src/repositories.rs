//! Typed bindings of the club collections, each with the read variants its screens use.

use std::{marker::PhantomData, sync::Arc};

use serde::de::DeserializeOwned;
use shared::{
    domain::{
        Collection, Fields, Match, MatchStatus, NewsArticle, Player, Record, RecordId,
        ShopCategory, ShopItem, Team,
    },
    protocol::{ListQuery, MutationResult},
};
use tracing::warn;

use crate::gateway::{CollectionGateway, Diagnostics, RecordBackend, RepositoryGateway};

pub trait Entity: DeserializeOwned {
    const COLLECTION: Collection;

    /// Joins and ordering applied to every plain `list`.
    fn base_query() -> ListQuery {
        ListQuery::new()
    }
}

impl Entity for Team {
    const COLLECTION: Collection = Collection::Teams;

    fn base_query() -> ListQuery {
        ListQuery::new().order_by("name", true)
    }
}

impl Entity for Player {
    const COLLECTION: Collection = Collection::Players;

    fn base_query() -> ListQuery {
        ListQuery::new()
            .join("team", Collection::Teams.as_str(), "team_id")
            .order_by("name", true)
    }
}

impl Entity for Match {
    const COLLECTION: Collection = Collection::Matches;

    fn base_query() -> ListQuery {
        ListQuery::new()
            .join("home_team", Collection::Teams.as_str(), "home_team_id")
            .join("away_team", Collection::Teams.as_str(), "away_team_id")
            .order_by("match_date", true)
    }
}

impl Entity for NewsArticle {
    const COLLECTION: Collection = Collection::News;

    fn base_query() -> ListQuery {
        ListQuery::new().order_by("published_at", false)
    }
}

impl Entity for ShopCategory {
    const COLLECTION: Collection = Collection::ShopCategories;

    fn base_query() -> ListQuery {
        ListQuery::new().order_by("sort_order", true)
    }
}

impl Entity for ShopItem {
    const COLLECTION: Collection = Collection::ShopItems;

    fn base_query() -> ListQuery {
        ListQuery::new()
            .join("category", Collection::ShopCategories.as_str(), "category_id")
            .order_by("name", true)
    }
}

pub struct Repository<E> {
    gateway: Arc<dyn RepositoryGateway>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            _entity: PhantomData,
        }
    }
}

pub type Teams = Repository<Team>;
pub type Players = Repository<Player>;
pub type Matches = Repository<Match>;
pub type News = Repository<NewsArticle>;
pub type ShopCategories = Repository<ShopCategory>;
pub type ShopItems = Repository<ShopItem>;

impl<E: Entity> Repository<E> {
    pub fn new(backend: Arc<dyn RecordBackend>, diagnostics: Diagnostics) -> Self {
        Self::from_gateway(
            CollectionGateway::with_diagnostics(backend, E::COLLECTION.as_str(), diagnostics)
                .into_shared(),
        )
    }

    pub fn from_gateway(gateway: Arc<dyn RepositoryGateway>) -> Self {
        if gateway.collection() != E::COLLECTION.as_str() {
            warn!(
                expected = E::COLLECTION.as_str(),
                actual = gateway.collection(),
                "repository: gateway bound to unexpected collection"
            );
        }
        Self {
            gateway,
            _entity: PhantomData,
        }
    }

    pub fn gateway(&self) -> Arc<dyn RepositoryGateway> {
        Arc::clone(&self.gateway)
    }

    pub async fn list(&self) -> Vec<Record> {
        self.gateway.list(Some(&E::base_query())).await
    }

    pub async fn list_where(&self, query: &ListQuery) -> Vec<Record> {
        self.gateway.list(Some(query)).await
    }

    pub async fn get_by_id(&self, id: &RecordId) -> Option<Record> {
        self.gateway.get_by_id(id).await
    }

    pub async fn create(&self, fields: Fields) -> MutationResult {
        self.gateway.create(fields).await
    }

    pub async fn update(&self, id: &RecordId, fields: Fields) -> MutationResult {
        self.gateway.update(id, fields).await
    }

    pub async fn delete(&self, id: &RecordId) -> MutationResult {
        self.gateway.delete(id).await
    }

    /// Rows that do not decode are skipped with a warning, like any other read failure.
    pub fn decode_all(records: &[Record]) -> Vec<E> {
        records
            .iter()
            .filter_map(|record| match record.decode::<E>() {
                Ok(entity) => Some(entity),
                Err(err) => {
                    warn!(
                        collection = E::COLLECTION.as_str(),
                        id = %record.id(),
                        error = %err,
                        "repository: skipping undecodable record"
                    );
                    None
                }
            })
            .collect()
    }

    pub async fn list_typed(&self) -> Vec<E> {
        Self::decode_all(&self.list().await)
    }
}

impl Repository<Team> {
    pub fn active_query() -> ListQuery {
        Team::base_query().eq("status", "active")
    }

    pub fn search_query(text: &str) -> ListQuery {
        Team::base_query().contains("name", text)
    }

    pub async fn active(&self) -> Vec<Record> {
        self.list_where(&Self::active_query()).await
    }

    pub async fn search(&self, text: &str) -> Vec<Record> {
        self.list_where(&Self::search_query(text)).await
    }
}

impl Repository<Player> {
    pub fn team_query(team_id: &RecordId) -> ListQuery {
        Player::base_query().eq("team_id", team_id.to_value())
    }

    pub fn position_query(position: &str) -> ListQuery {
        Player::base_query().eq("position", position)
    }

    pub fn search_query(text: &str) -> ListQuery {
        Player::base_query().contains("name", text)
    }

    pub async fn by_team(&self, team_id: &RecordId) -> Vec<Record> {
        self.list_where(&Self::team_query(team_id)).await
    }

    pub async fn by_position(&self, position: &str) -> Vec<Record> {
        self.list_where(&Self::position_query(position)).await
    }

    pub async fn search(&self, text: &str) -> Vec<Record> {
        self.list_where(&Self::search_query(text)).await
    }
}

impl Repository<Match> {
    pub fn team_query(team_id: &RecordId) -> ListQuery {
        Match::base_query().any_eq(["home_team_id", "away_team_id"], team_id.to_value())
    }

    pub fn status_query(status: MatchStatus) -> ListQuery {
        Match::base_query().eq("status", status.as_str())
    }

    pub async fn by_team(&self, team_id: &RecordId) -> Vec<Record> {
        self.list_where(&Self::team_query(team_id)).await
    }

    pub async fn by_status(&self, status: MatchStatus) -> Vec<Record> {
        self.list_where(&Self::status_query(status)).await
    }
}

impl Repository<NewsArticle> {
    pub fn published_query() -> ListQuery {
        NewsArticle::base_query().eq("status", "published")
    }

    pub fn category_query(category: &str) -> ListQuery {
        NewsArticle::base_query().eq("category", category)
    }

    pub fn search_query(text: &str) -> ListQuery {
        NewsArticle::base_query().contains("title", text)
    }

    pub async fn published(&self) -> Vec<Record> {
        self.list_where(&Self::published_query()).await
    }

    pub async fn by_category(&self, category: &str) -> Vec<Record> {
        self.list_where(&Self::category_query(category)).await
    }

    pub async fn search(&self, text: &str) -> Vec<Record> {
        self.list_where(&Self::search_query(text)).await
    }
}

impl Repository<ShopCategory> {
    pub async fn ordered(&self) -> Vec<Record> {
        self.list().await
    }
}

impl Repository<ShopItem> {
    pub fn category_query(category_id: &RecordId) -> ListQuery {
        ShopItem::base_query().eq("category_id", category_id.to_value())
    }

    pub fn available_query() -> ListQuery {
        ShopItem::base_query().eq("status", "active")
    }

    pub fn search_query(text: &str) -> ListQuery {
        ShopItem::base_query().contains("name", text)
    }

    pub async fn by_category(&self, category_id: &RecordId) -> Vec<Record> {
        self.list_where(&Self::category_query(category_id)).await
    }

    pub async fn available(&self) -> Vec<Record> {
        self.list_where(&Self::available_query()).await
    }

    pub async fn search(&self, text: &str) -> Vec<Record> {
        self.list_where(&Self::search_query(text)).await
    }
}

/// Text-search query for any collection, using the field its screens search on.
pub fn search_query(collection: Collection, text: &str) -> ListQuery {
    match collection {
        Collection::Teams => Teams::search_query(text),
        Collection::Players => Players::search_query(text),
        Collection::News => News::search_query(text),
        Collection::ShopItems => ShopItems::search_query(text),
        Collection::Matches => Match::base_query().contains("competition", text),
        Collection::ShopCategories => ShopCategory::base_query().contains("name", text),
    }
}

/// The query a plain list screen uses for `collection`.
pub fn base_query(collection: Collection) -> ListQuery {
    match collection {
        Collection::Teams => Team::base_query(),
        Collection::Players => Player::base_query(),
        Collection::News => NewsArticle::base_query(),
        Collection::Matches => Match::base_query(),
        Collection::ShopCategories => ShopCategory::base_query(),
        Collection::ShopItems => ShopItem::base_query(),
    }
}

#[cfg(test)]
#[path = "tests/repositories_tests.rs"]
mod tests;
