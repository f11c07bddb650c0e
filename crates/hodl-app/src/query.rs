//! The read-only query surface.
//!
//! Every request is served from an immutable height snapshot; queries never
//! touch the pending block image. The JSON-tagged [`QueryRequest`] enum is
//! also the wire form for the external query server.

use serde::{Deserialize, Serialize};

use hodl_core::coin::Coin;
use hodl_core::error::Error;
use hodl_core::msg::Side;
use hodl_core::types::{Address, Amount, Height, HRP_ACCOUNT};
use hodl_dex::{Market, MarketStats, Order, Trade};
use hodl_equity::{Company, Dividend};
use hodl_gov::{Proposal, VoteRecord};
use hodl_stablecoin::CollateralPosition;
use hodl_store::MemStore;
use hodl_validator::{BusinessVerification, Validator};

use crate::app::App;
use crate::auth::{self, Account};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum QueryRequest {
    Account { address: String },
    Balance { address: String, denom: String },
    Balances { address: String },
    Position { address: String },
    Company { symbol: String },
    Dividend { id: u64 },
    Market { symbol: String },
    Depth { symbol: String, levels: usize },
    Order { id: u64 },
    Trades { symbol: String, offset: usize, limit: usize },
    Stats { symbol: String },
    Validator { address: String },
    Verification { id: u64 },
    Proposal { id: u64 },
    Vote { proposal_id: u64, voter: String },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResponse {
    Account(Option<Account>),
    Balance(Amount),
    Balances(Vec<Coin>),
    Position(Option<CollateralPosition>),
    Company(Option<Company>),
    Dividend(Option<Dividend>),
    Market(Option<Market>),
    Depth { bids: Vec<(Amount, Amount)>, asks: Vec<(Amount, Amount)> },
    Order(Option<Order>),
    Trades(Vec<Trade>),
    Stats(MarketStats),
    Validator(Option<Validator>),
    Verification(Option<BusinessVerification>),
    Proposal(Option<Proposal>),
    Vote(Option<VoteRecord>),
}

fn parse_addr(s: &str) -> Result<Address, Error> {
    Address::from_bech32(s, HRP_ACCOUNT)
}

pub(crate) fn dispatch(
    app: &App,
    snapshot: &MemStore,
    req: QueryRequest,
) -> Result<QueryResponse, Error> {
    let (bank, stablecoin, equity, dex, validators, gov) = app.keepers();
    let params = app.current_params();
    match req {
        QueryRequest::Account { address } => {
            let addr = parse_addr(&address)?;
            Ok(QueryResponse::Account(auth::account(snapshot, &addr)?))
        }
        QueryRequest::Balance { address, denom } => {
            let addr = parse_addr(&address)?;
            Ok(QueryResponse::Balance(bank.balance(snapshot, &addr, &denom)?))
        }
        QueryRequest::Balances { address } => {
            let addr = parse_addr(&address)?;
            Ok(QueryResponse::Balances(bank.balances_of(snapshot, &addr)?))
        }
        QueryRequest::Position { address } => {
            let addr = parse_addr(&address)?;
            Ok(QueryResponse::Position(stablecoin.position(snapshot, &addr)?))
        }
        QueryRequest::Company { symbol } => {
            Ok(QueryResponse::Company(equity.company(snapshot, &symbol)?))
        }
        QueryRequest::Dividend { id } => Ok(QueryResponse::Dividend(
            hodl_equity::dividend::dividend(snapshot, id)?,
        )),
        QueryRequest::Market { symbol } => {
            Ok(QueryResponse::Market(dex.market(snapshot, &symbol)?))
        }
        QueryRequest::Depth { symbol, levels } => Ok(QueryResponse::Depth {
            bids: dex.depth(snapshot, &symbol, Side::Buy, levels)?,
            asks: dex.depth(snapshot, &symbol, Side::Sell, levels)?,
        }),
        QueryRequest::Order { id } => Ok(QueryResponse::Order(dex.order(snapshot, id)?)),
        QueryRequest::Trades { symbol, offset, limit } => Ok(QueryResponse::Trades(
            dex.trades(snapshot, &symbol, offset, limit.min(1_000))?,
        )),
        QueryRequest::Stats { symbol } => Ok(QueryResponse::Stats(dex.stats_24h(
            snapshot,
            &params.dex,
            &symbol,
            app.height(),
        )?)),
        QueryRequest::Validator { address } => {
            let addr = parse_addr(&address)?;
            Ok(QueryResponse::Validator(validators.validator(snapshot, &addr)?))
        }
        QueryRequest::Verification { id } => Ok(QueryResponse::Verification(
            validators.verification(snapshot, id)?,
        )),
        QueryRequest::Proposal { id } => Ok(QueryResponse::Proposal(gov.proposal(snapshot, id)?)),
        QueryRequest::Vote { proposal_id, voter } => {
            let addr = parse_addr(&voter)?;
            Ok(QueryResponse::Vote(gov.vote_of(snapshot, proposal_id, &addr)?))
        }
    }
}

impl App {
    /// Wire form of [`App::query`]: JSON request in, JSON response out.
    pub fn query_raw(&self, data: &[u8], height: Option<Height>) -> Result<Vec<u8>, Error> {
        let req: QueryRequest =
            serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))?;
        let resp = self.query(req, height)?;
        serde_json::to_vec(&resp).map_err(|e| Error::Serialization(e.to_string()))
    }
}
