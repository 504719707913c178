//! Sample club data for `--offline` sessions.

use client_core::InMemoryBackend;
use serde_json::json;
use shared::domain::Collection;

pub async fn seeded_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend
        .seed(
            Collection::Teams.as_str(),
            [
                json!({ "id": 1, "name": "Falcons Senior", "category": "Senior", "status": "active", "coach": "Ana Ruiz" }),
                json!({ "id": 2, "name": "Falcons U19", "category": "U19", "status": "active" }),
            ],
        )
        .await;
    backend
        .seed(
            Collection::Players.as_str(),
            [
                json!({ "id": 1, "name": "Lina Ortiz", "team_id": 1, "position": "goalkeeper", "jersey_number": 1 }),
                json!({ "id": 2, "name": "Marta Gil", "team_id": 1, "position": "forward", "jersey_number": 9 }),
                json!({ "id": 3, "name": "Sara Poll", "team_id": 2, "position": "defender", "jersey_number": 4 }),
            ],
        )
        .await;
    backend
        .seed(
            Collection::Matches.as_str(),
            [json!({
                "id": 1,
                "home_team_id": 1,
                "opponent": "Harbour City",
                "competition": "League",
                "match_date": "2026-11-07T15:00:00Z",
                "status": "scheduled"
            })],
        )
        .await;
    backend
        .seed(
            Collection::News.as_str(),
            [json!({
                "id": 1,
                "title": "Season tickets on sale",
                "content": "Pick yours up at the club office.",
                "category": "club",
                "status": "published",
                "tags": ["tickets"],
                "published_at": "2026-10-01T09:00:00Z"
            })],
        )
        .await;
    backend
        .seed(
            Collection::ShopCategories.as_str(),
            [json!({ "id": 1, "name": "Jerseys", "sort_order": 1 })],
        )
        .await;
    backend
        .seed(
            Collection::ShopItems.as_str(),
            [json!({
                "id": 1,
                "name": "Home jersey 26/27",
                "price": 59.9,
                "category_id": 1,
                "status": "active",
                "attributes": { "sizes": ["S", "M", "L"] }
            })],
        )
        .await;
    backend
}
