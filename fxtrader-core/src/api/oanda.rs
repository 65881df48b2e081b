//! OANDA v1 REST client.
//!
//! Blocking `reqwest` client with bearer authentication. Each call is a
//! single attempt; retry policy belongs to the broker adapter so backtest
//! paging and live trading can bound it differently.

use super::types::{
    CandleRequest, CloseReceipt, OrderReceipt, OrderTicket, Quote, Transaction, WireDecimal,
};
use super::{ApiError, BrokerageApi};
use crate::domain::{Candle, Instrument, OrderId};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Which OANDA deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Practice,
    Live,
    Sandbox,
}

impl Environment {
    pub const fn base_url(self) -> &'static str {
        match self {
            Environment::Practice => "https://api-fxpractice.oanda.com",
            Environment::Live => "https://api-fxtrade.oanda.com",
            Environment::Sandbox => "http://api-sandbox.oanda.com",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" => Ok(Environment::Practice),
            "live" => Ok(Environment::Live),
            "sandbox" => Ok(Environment::Sandbox),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

// ── Wire format ──

#[derive(Debug, Deserialize)]
struct AccountReply {
    balance: WireDecimal,
}

#[derive(Debug, Deserialize)]
struct PricesReply {
    prices: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    instrument: String,
    time: DateTime<Utc>,
    bid: WireDecimal,
    ask: WireDecimal,
}

#[derive(Debug, Deserialize)]
struct CandlesReply {
    candles: Vec<CandleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleEntry {
    time: DateTime<Utc>,
    open_bid: WireDecimal,
    open_ask: WireDecimal,
    high_bid: WireDecimal,
    high_ask: WireDecimal,
    low_bid: WireDecimal,
    low_ask: WireDecimal,
    close_bid: WireDecimal,
    close_ask: WireDecimal,
    volume: u64,
    complete: bool,
}

impl From<CandleEntry> for Candle {
    fn from(c: CandleEntry) -> Self {
        Candle {
            time: c.time,
            open_bid: c.open_bid.0,
            open_ask: c.open_ask.0,
            high_bid: c.high_bid.0,
            high_ask: c.high_ask.0,
            low_bid: c.low_bid.0,
            low_ask: c.low_ask.0,
            close_bid: c.close_bid.0,
            close_ask: c.close_ask.0,
            volume: c.volume,
            complete: c.complete,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsReply {
    instruments: Vec<InstrumentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentEntry {
    instrument: String,
    pip: WireDecimal,
    max_trade_units: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderReply {
    time: DateTime<Utc>,
    price: WireDecimal,
    order_opened: Option<OpenedEntry>,
    trade_opened: Option<OpenedEntry>,
}

#[derive(Debug, Deserialize)]
struct OpenedEntry {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct CloseReply {
    id: u64,
    price: WireDecimal,
    time: DateTime<Utc>,
    profit: WireDecimal,
}

#[derive(Debug, Deserialize)]
struct TransactionsReply {
    transactions: Vec<TransactionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionEntry {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    order_id: Option<u64>,
    price: Option<WireDecimal>,
    stop_loss_price: Option<WireDecimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorReply {
    code: Option<i64>,
    message: Option<String>,
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

fn broker_error(status: StatusCode, body: &str) -> ApiError {
    let reply: ErrorReply = serde_json::from_str(body).unwrap_or_default();
    ApiError::Broker {
        code: reply.code.unwrap_or_else(|| i64::from(status.as_u16())),
        message: reply
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_decode() {
        ApiError::Malformed(e.to_string())
    } else {
        ApiError::Connection(e.to_string())
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn order_receipt(reply: OrderReply) -> Result<OrderReceipt, ApiError> {
    let opened = reply
        .order_opened
        .or(reply.trade_opened)
        .ok_or_else(|| ApiError::Malformed("reply has neither orderOpened nor tradeOpened".into()))?;
    Ok(OrderReceipt {
        id: OrderId(opened.id),
        price: reply.price.0,
        time: reply.time,
    })
}

fn order_form(ticket: &OrderTicket) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("instrument", ticket.instrument.clone()),
        ("units", ticket.units.to_string()),
        ("side", ticket.side.to_string()),
        ("type", ticket.order_type.code().to_string()),
    ];
    if let Some(price) = ticket.price {
        form.push(("price", price.to_string()));
    }
    if let Some(expiry) = ticket.expiry {
        form.push(("expiry", timestamp(expiry)));
    }
    if let Some(stop_loss) = ticket.stop_loss {
        form.push(("stopLoss", stop_loss.to_string()));
    }
    if let Some(take_profit) = ticket.take_profit {
        form.push(("takeProfit", take_profit.to_string()));
    }
    form
}

// ── Client ──

pub struct OandaClient {
    client: Client,
    base_url: String,
    access_token: String,
    account_id: String,
}

impl OandaClient {
    pub fn new(
        environment: Environment,
        access_token: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::with_base_url(environment.base_url(), access_token, account_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            account_id: account_id.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn account_url(&self, rest: &str) -> String {
        self.url(&format!("/v1/accounts/{}{}", self.account_id, rest))
    }

    fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        debug!(%status, bytes = body.len(), "upstream reply");
        Ok((status, body))
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let (status, body) = self.send(request)?;
        if !status.is_success() {
            return Err(broker_error(status, &body));
        }
        decode(&body)
    }

    fn exists(&self, url: String) -> Result<bool, ApiError> {
        let (status, body) = self.send(self.client.get(url))?;
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(broker_error(status, &body))
        }
    }
}

impl BrokerageApi for OandaClient {
    fn account_balance(&self) -> Result<Decimal, ApiError> {
        let reply: AccountReply = self.execute(self.client.get(self.account_url("")))?;
        Ok(reply.balance.0)
    }

    fn prices(&self, instrument: &str) -> Result<Vec<Quote>, ApiError> {
        let request = self
            .client
            .get(self.url("/v1/prices"))
            .query(&[("instruments", instrument)]);
        let reply: PricesReply = self.execute(request)?;
        Ok(reply
            .prices
            .into_iter()
            .map(|p| Quote {
                instrument: p.instrument,
                time: p.time,
                bid: p.bid.0,
                ask: p.ask.0,
            })
            .collect())
    }

    fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, ApiError> {
        let mut query = vec![
            ("instrument", request.instrument.clone()),
            ("granularity", request.timeframe.code().to_string()),
            ("candleFormat", "bidask".to_string()),
            ("includeFirst", request.include_first.to_string()),
        ];
        if let Some(start) = request.start {
            query.push(("start", timestamp(start)));
        }
        if let Some(end) = request.end {
            query.push(("end", timestamp(end)));
        }
        if let Some(count) = request.count {
            query.push(("count", count.to_string()));
        }
        let reply: CandlesReply = self.execute(self.client.get(self.url("/v1/candles")).query(&query))?;
        Ok(reply.candles.into_iter().map(Candle::from).collect())
    }

    fn instrument(&self, symbol: &str) -> Result<Instrument, ApiError> {
        let request = self.client.get(self.url("/v1/instruments")).query(&[
            ("accountId", self.account_id.as_str()),
            ("instruments", symbol),
            ("fields", "instrument,pip,maxTradeUnits"),
        ]);
        let reply: InstrumentsReply = self.execute(request)?;
        let entry = reply
            .instruments
            .into_iter()
            .find(|i| i.instrument == symbol)
            .ok_or_else(|| ApiError::Malformed(format!("instrument {symbol} missing from reply")))?;
        Instrument::from_symbol(&entry.instrument, entry.pip.0, entry.max_trade_units)
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    fn create_order(&self, ticket: &OrderTicket) -> Result<OrderReceipt, ApiError> {
        let request = self.client.post(self.account_url("/orders")).form(&order_form(ticket));
        order_receipt(self.execute(request)?)
    }

    fn close_trade(&self, trade_id: OrderId) -> Result<CloseReceipt, ApiError> {
        let url = self.account_url(&format!("/trades/{trade_id}"));
        let reply: CloseReply = self.execute(self.client.delete(url))?;
        Ok(CloseReceipt {
            id: OrderId(reply.id),
            price: reply.price.0,
            time: reply.time,
            profit: reply.profit.0,
        })
    }

    fn cancel_order(&self, order_id: OrderId) -> Result<(), ApiError> {
        let url = self.account_url(&format!("/orders/{order_id}"));
        let _: serde_json::Value = self.execute(self.client.delete(url))?;
        Ok(())
    }

    fn order_exists(&self, order_id: OrderId) -> Result<bool, ApiError> {
        self.exists(self.account_url(&format!("/orders/{order_id}")))
    }

    fn trade_exists(&self, trade_id: OrderId) -> Result<bool, ApiError> {
        self.exists(self.account_url(&format!("/trades/{trade_id}")))
    }

    fn transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        let reply: TransactionsReply = self.execute(self.client.get(self.account_url("/transactions")))?;
        Ok(reply
            .transactions
            .into_iter()
            .map(|t| Transaction {
                id: OrderId(t.id),
                kind: t.kind,
                order_id: t.order_id.map(OrderId),
                price: t.price.map(Decimal::from),
                stop_loss_price: t.stop_loss_price.map(Decimal::from),
            })
            .collect())
    }
}
