use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::server::authz::action::DealAction;
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::{DealQuery, DealRecord};
use crate::server::response::{EndpointError, Response};

use super::{paginate, Authorization, Endpoint, EndpointContext, EndpointRequest, PAGE_SIZE};

#[derive(Debug, Deserialize)]
pub struct NewDeal {
    pub game_id: u64,
    #[serde(default)]
    pub image_url: Option<String>,
    pub link: String,
    pub price: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub deal: NewDeal,
}

#[derive(Debug, Serialize)]
struct DealResponse {
    deal: DealRecord,
}

/// Posts a deal for an existing game, authored by the caller.
pub struct CreateDealEndpoint {
    ctx: Arc<EndpointContext>,
}

impl CreateDealEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }

    fn validate(deal: &NewDeal) -> Result<(), EndpointError> {
        if deal.link.trim().is_empty() {
            return Err(EndpointError::bad_request("deal link cannot be empty"));
        }
        if !deal.price.is_finite() || deal.price < 0.0 {
            return Err(EndpointError::bad_request(
                "deal price must be a non-negative number",
            ));
        }
        if deal.end_date < deal.start_date {
            return Err(EndpointError::bad_request(
                "deal end_date cannot be before start_date",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Endpoint for CreateDealEndpoint {
    type Body = CreateDealRequest;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/deal"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<CreateDealRequest>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::Deal),
            DealAction::Create,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<CreateDealRequest>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let author_id = req.require_user()?.id;
        let new = req.body.deal;
        Self::validate(&new)?;
        let game_id = new.game_id;

        let deal = self.ctx.db.with_transaction(|tx| {
            if tx.get_game(game_id)?.is_none() {
                return Ok(None);
            }
            let deal = tx.create_deal(DealRecord {
                id: 0,
                game_id,
                author_id,
                image_url: new.image_url,
                link: new.link,
                price: new.price,
                start_date: new.start_date,
                end_date: new.end_date,
                create_time: 0,
            })?;
            Ok(Some(deal))
        })?;

        let Some(deal) = deal else {
            return Err(EndpointError::not_found(format!(
                "Game with ID {game_id} does not exist"
            )));
        };
        info!(
            "User {author_id} created deal {} for game {}",
            deal.id, deal.game_id
        );
        Ok(Response::json(&DealResponse { deal }))
    }
}

#[derive(Debug, Deserialize)]
struct ListDealsQuery {
    #[serde(default)]
    offset: u64,

    /// Include deals that have not started yet
    #[serde(default)]
    before_start: bool,

    /// Include deals that already ended
    #[serde(default)]
    expired: bool,
}

#[derive(Debug, Serialize)]
struct ListDealsResponse {
    deals: Vec<DealRecord>,
    next_offset: i64,
}

/// Current deals ordered by start date. `before_start` and `expired` widen
/// the window.
pub struct ListDealsEndpoint {
    ctx: Arc<EndpointContext>,
}

impl ListDealsEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for ListDealsEndpoint {
    type Body = IgnoredAny;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &'static str {
        "/api/v1/deal"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<IgnoredAny>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::wildcard(ResourceKind::Deal),
            DealAction::Retrieve,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<IgnoredAny>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let params: ListDealsQuery = req.query()?;
        let query = DealQuery {
            offset: params.offset,
            limit: PAGE_SIZE + 1,
            before_start: params.before_start,
            expired: params.expired,
            now: Utc::now(),
        };
        let mut deals = self.ctx.db.with_transaction(|tx| tx.list_deals(&query))?;
        let next_offset = paginate(&mut deals, params.offset);
        Ok(Response::json(&ListDealsResponse { deals, next_offset }))
    }
}
