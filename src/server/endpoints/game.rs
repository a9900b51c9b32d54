use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use log::info;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::server::authz::action::GameAction;
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::GameRecord;
use crate::server::response::{EndpointError, Response};

use super::{paginate, Authorization, Endpoint, EndpointContext, EndpointRequest, PAGE_SIZE};

#[derive(Debug, Deserialize)]
pub struct NewGame {
    pub name: String,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub game: NewGame,
}

#[derive(Debug, Serialize)]
struct GameResponse {
    game: GameRecord,
}

pub struct CreateGameEndpoint {
    ctx: Arc<EndpointContext>,
}

impl CreateGameEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for CreateGameEndpoint {
    type Body = CreateGameRequest;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/game"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<CreateGameRequest>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::Game),
            GameAction::Create,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<CreateGameRequest>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let NewGame { name, image_url } = req.body.game;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EndpointError::bad_request("game name cannot be empty"));
        }

        let game = self.ctx.db.with_transaction(|tx| {
            tx.create_game(GameRecord {
                id: 0,
                name,
                image_url,
                create_time: 0,
            })
        })?;
        info!("Created game {} '{}'", game.id, game.name);
        Ok(Response::json(&GameResponse { game }))
    }
}

#[derive(Debug, Deserialize)]
struct ListGamesQuery {
    #[serde(default)]
    offset: u64,
}

#[derive(Debug, Serialize)]
struct ListGamesResponse {
    games: Vec<GameRecord>,
    next_offset: i64,
}

pub struct ListGamesEndpoint {
    ctx: Arc<EndpointContext>,
}

impl ListGamesEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for ListGamesEndpoint {
    type Body = IgnoredAny;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &'static str {
        "/api/v1/game"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<IgnoredAny>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::wildcard(ResourceKind::Game),
            GameAction::Retrieve,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<IgnoredAny>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let query: ListGamesQuery = req.query()?;
        let mut games = self
            .ctx
            .db
            .with_transaction(|tx| tx.list_games(query.offset, PAGE_SIZE + 1))?;
        let next_offset = paginate(&mut games, query.offset);
        Ok(Response::json(&ListGamesResponse { games, next_offset }))
    }
}
