//! Reference Wire Dialect
//!
//! A typed JSON/MessagePack stream dialect and its translator. Venue
//! connectors with their own schemas implement [`MessageTranslator`]
//! directly; this dialect covers the common shape (discriminated frame
//! arrays, string-or-number decimals, epoch timestamps) and is what the
//! fixture servers in the test suite speak.
//!
//! # Wire Format
//!
//! Messages arrive as JSON arrays of frame objects (or a bare object for
//! control frames); binary frames carry the same shapes as MessagePack
//! maps. Every frame has a `T` discriminator:
//!
//! ```json
//! [{"T":"tick","S":"BTC-USD","bp":"42000.1","bs":"0.5","ap":"42000.9","as":"0.7","t":1712000000000}]
//! [{"T":"trade","S":"BTC-USD","p":"42001","v":"0.02","sd":"b","t":1712000000010}]
//! [{"T":"order","cid":17,"oid":"ab-1","st":"fill","fv":"0.02","rv":"0","px":"42001"}]
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::{
    CommandMethod, CommandPayload, FramePayload, MessageTranslator, RawFrame, TranslateError,
};
use crate::domain::message::{
    BalanceEvent, BookEvent, BookLevel, ErrorEvent, NormalizedMessage, OrderEvent, OrderIntent,
    OrderState, TradeEvent, TransactionId,
};
use crate::domain::subscription::SubscriptionKind;

use super::{SideTable, TimeUnit, de_opt_decimal, normalize_time};

// =============================================================================
// Frame Types
// =============================================================================

/// Top-of-book update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFrame {
    /// Frame discriminator (always "tick").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Instrument symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Best bid price.
    #[serde(rename = "bp", default, deserialize_with = "de_opt_decimal")]
    pub bid_price: Option<Decimal>,

    /// Best bid volume.
    #[serde(rename = "bs", default, deserialize_with = "de_opt_decimal")]
    pub bid_volume: Option<Decimal>,

    /// Best ask price.
    #[serde(rename = "ap", default, deserialize_with = "de_opt_decimal")]
    pub ask_price: Option<Decimal>,

    /// Best ask volume.
    #[serde(rename = "as", default, deserialize_with = "de_opt_decimal")]
    pub ask_volume: Option<Decimal>,

    /// Venue timestamp in the dialect's unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Order book depth update. Levels are `[price, volume]` string pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFrame {
    /// Frame discriminator (always "book").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Instrument symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bid levels, best first.
    #[serde(rename = "b", default)]
    pub bids: Vec<(String, String)>,

    /// Ask levels, best first.
    #[serde(rename = "a", default)]
    pub asks: Vec<(String, String)>,

    /// Venue timestamp in the dialect's unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Public trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFrame {
    /// Frame discriminator (always "trade").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Instrument symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Execution price.
    #[serde(rename = "p", default, deserialize_with = "de_opt_decimal")]
    pub price: Option<Decimal>,

    /// Executed volume.
    #[serde(rename = "v", default, deserialize_with = "de_opt_decimal")]
    pub volume: Option<Decimal>,

    /// Aggressor side code.
    #[serde(rename = "sd")]
    pub side: String,

    /// Venue timestamp in the dialect's unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Own-order lifecycle update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFrame {
    /// Frame discriminator (always "order").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Echo of the client tag sent with the command, when present.
    #[serde(rename = "cid", default)]
    pub client_id: Option<TransactionId>,

    /// Venue-assigned order id.
    #[serde(rename = "oid", default)]
    pub order_id: Option<String>,

    /// Order state code.
    #[serde(rename = "st")]
    pub state: String,

    /// Filled volume.
    #[serde(rename = "fv", default, deserialize_with = "de_opt_decimal")]
    pub filled_volume: Option<Decimal>,

    /// Remaining volume.
    #[serde(rename = "rv", default, deserialize_with = "de_opt_decimal")]
    pub remaining_volume: Option<Decimal>,

    /// Order/execution price.
    #[serde(rename = "px", default, deserialize_with = "de_opt_decimal")]
    pub price: Option<Decimal>,

    /// Venue detail (rejection reason etc.).
    #[serde(rename = "rs", default)]
    pub reason: Option<String>,

    /// Venue timestamp in the dialect's unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Balance update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceFrame {
    /// Frame discriminator (always "bal").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Asset/currency code.
    #[serde(rename = "cur")]
    pub asset: String,

    /// Freely available amount.
    #[serde(rename = "av", default, deserialize_with = "de_opt_decimal")]
    pub available: Option<Decimal>,

    /// Amount held by working orders.
    #[serde(rename = "hd", default, deserialize_with = "de_opt_decimal")]
    pub held: Option<Decimal>,

    /// Venue timestamp in the dialect's unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Venue error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Frame discriminator (always "error").
    #[serde(rename = "T")]
    pub frame_type: String,

    /// Venue error code.
    pub code: i32,

    /// Venue error message.
    pub msg: String,
}

// =============================================================================
// Dialect Configuration
// =============================================================================

/// Per-venue knobs of the reference dialect.
#[derive(Debug, Clone)]
pub struct WireDialect {
    /// Unit of the `t` timestamp fields.
    pub time_unit: TimeUnit,
    /// Command path for order registration.
    pub orders_path: String,
    /// Command path for order cancellation.
    pub cancel_path: String,
}

impl Default for WireDialect {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::Millis,
            orders_path: "/v1/orders".to_string(),
            cancel_path: "/v1/orders/cancel".to_string(),
        }
    }
}

/// Build the subscribe frame carrying a stream's desired key set.
#[must_use]
pub fn subscribe_frame(kind: SubscriptionKind, symbols: &[String]) -> String {
    serde_json::json!({
        "op": "subscribe",
        "channel": kind.as_str(),
        "symbols": symbols,
    })
    .to_string()
}

// =============================================================================
// Translator
// =============================================================================

/// [`MessageTranslator`] for the reference dialect.
pub struct WireTranslator {
    dialect: WireDialect,
    sides: SideTable,
}

impl Default for WireTranslator {
    fn default() -> Self {
        Self::new(WireDialect::default())
    }
}

impl WireTranslator {
    /// Create a translator with the standard side table.
    #[must_use]
    pub fn new(dialect: WireDialect) -> Self {
        Self {
            dialect,
            sides: SideTable::standard(),
        }
    }

    /// Override the side table for venues with nonstandard codes.
    #[must_use]
    pub fn with_sides(mut self, sides: SideTable) -> Self {
        self.sides = sides;
        self
    }

    fn decode_values(frame: &RawFrame) -> Result<Vec<serde_json::Value>, TranslateError> {
        match &frame.payload {
            FramePayload::Text(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with('[') {
                    serde_json::from_str(trimmed)
                        .map_err(|e| TranslateError::Malformed(e.to_string()))
                } else if trimmed.starts_with('{') {
                    let value: serde_json::Value = serde_json::from_str(trimmed)
                        .map_err(|e| TranslateError::Malformed(e.to_string()))?;
                    Ok(vec![value])
                } else {
                    Err(TranslateError::Malformed(format!(
                        "expected JSON array or object, got: {}",
                        &trimmed[..trimmed.len().min(50)]
                    )))
                }
            }
            FramePayload::Binary(bytes) => {
                if let Ok(values) = rmp_serde::from_slice::<Vec<serde_json::Value>>(bytes) {
                    return Ok(values);
                }
                rmp_serde::from_slice::<serde_json::Value>(bytes)
                    .map(|value| vec![value])
                    .map_err(|e| TranslateError::Malformed(e.to_string()))
            }
        }
    }

    fn translate_value(
        &self,
        kind: SubscriptionKind,
        value: serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Result<Option<NormalizedMessage>, TranslateError> {
        let Some(discriminator) = value.get("T").and_then(serde_json::Value::as_str) else {
            return Err(TranslateError::Malformed(
                "frame has no `T` discriminator".to_string(),
            ));
        };

        match discriminator {
            "tick" => {
                let f: TickFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Book(BookEvent {
                    symbol: f.symbol,
                    bids: level_from_top(f.bid_price, f.bid_volume),
                    asks: level_from_top(f.ask_price, f.ask_volume),
                    server_time: normalize_time(self.dialect.time_unit, f.timestamp, received_at),
                })))
            }
            "book" => {
                let f: BookFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Book(BookEvent {
                    symbol: f.symbol,
                    bids: parse_levels("b", &f.bids)?,
                    asks: parse_levels("a", &f.asks)?,
                    server_time: normalize_time(self.dialect.time_unit, f.timestamp, received_at),
                })))
            }
            "trade" => {
                let f: TradeFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Trade(TradeEvent {
                    symbol: f.symbol,
                    price: f.price.ok_or(TranslateError::MissingField { field: "p" })?,
                    volume: f.volume.ok_or(TranslateError::MissingField { field: "v" })?,
                    side: self.sides.decode(&f.side)?,
                    server_time: normalize_time(self.dialect.time_unit, f.timestamp, received_at),
                })))
            }
            "order" => {
                let f: OrderFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Order(OrderEvent {
                    transaction_id: f.client_id,
                    external_order_id: f.order_id,
                    state: order_state_from_code(&f.state)?,
                    filled_volume: f.filled_volume,
                    remaining_volume: f.remaining_volume,
                    price: f.price,
                    reason: f.reason,
                    server_time: normalize_time(self.dialect.time_unit, f.timestamp, received_at),
                })))
            }
            "bal" => {
                let f: BalanceFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Balance(BalanceEvent {
                    asset: f.asset,
                    available: f.available,
                    reserved: f.held,
                    server_time: normalize_time(self.dialect.time_unit, f.timestamp, received_at),
                })))
            }
            "error" => {
                let f: ErrorFrame = typed(value)?;
                Ok(Some(NormalizedMessage::Error(ErrorEvent {
                    kind: Some(kind),
                    message: format!("venue error {}: {}", f.code, f.msg),
                    transaction_id: None,
                })))
            }
            // Control frames: connection/subscription acks carry no payload
            "success" | "sub" => Ok(None),
            other => Err(TranslateError::UnknownFrame {
                discriminator: other.to_string(),
            }),
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, TranslateError> {
    serde_json::from_value(value).map_err(|e| TranslateError::Malformed(e.to_string()))
}

fn level_from_top(price: Option<Decimal>, volume: Option<Decimal>) -> Vec<BookLevel> {
    price
        .map(|price| BookLevel { price, volume })
        .into_iter()
        .collect()
}

fn parse_levels(
    field: &'static str,
    levels: &[(String, String)],
) -> Result<Vec<BookLevel>, TranslateError> {
    levels
        .iter()
        .map(|(price, volume)| {
            let price = price
                .parse::<Decimal>()
                .map_err(|e| TranslateError::InvalidField {
                    field,
                    reason: format!("bad price `{price}`: {e}"),
                })?;
            let volume = volume
                .parse::<Decimal>()
                .map_err(|e| TranslateError::InvalidField {
                    field,
                    reason: format!("bad volume `{volume}`: {e}"),
                })?;
            Ok(BookLevel {
                price,
                volume: Some(volume),
            })
        })
        .collect()
}

fn order_state_from_code(code: &str) -> Result<OrderState, TranslateError> {
    match code {
        "open" => Ok(OrderState::Active),
        "part" => Ok(OrderState::PartiallyFilled),
        "fill" => Ok(OrderState::Filled),
        "canc" => Ok(OrderState::Cancelled),
        "rej" => Ok(OrderState::Rejected),
        "exp" => Ok(OrderState::Expired),
        other => Err(TranslateError::InvalidField {
            field: "st",
            reason: format!("unknown order state `{other}`"),
        }),
    }
}

impl MessageTranslator for WireTranslator {
    fn translate(
        &self,
        kind: SubscriptionKind,
        frame: &RawFrame,
    ) -> Result<Vec<NormalizedMessage>, TranslateError> {
        let values = Self::decode_values(frame)?;
        let mut messages = Vec::with_capacity(values.len());
        for value in values {
            if let Some(message) = self.translate_value(kind, value, frame.received_at)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn encode_register(
        &self,
        transaction_id: TransactionId,
        intent: &OrderIntent,
    ) -> Result<CommandPayload, TranslateError> {
        let side = self.sides.encode(intent.side)?;
        let body = serde_json::json!({
            "op": "order.new",
            "cid": transaction_id,
            "sym": intent.symbol,
            "side": side,
            "px": intent.price.to_string(),
            "vol": intent.volume.to_string(),
        })
        .to_string();

        Ok(CommandPayload {
            method: CommandMethod::Post,
            path: self.dialect.orders_path.clone(),
            body,
        })
    }

    fn encode_cancel(
        &self,
        transaction_id: TransactionId,
        external_order_id: &str,
    ) -> Result<CommandPayload, TranslateError> {
        let body = serde_json::json!({
            "op": "order.cancel",
            "cid": transaction_id,
            "oid": external_order_id,
        })
        .to_string();

        Ok(CommandPayload {
            method: CommandMethod::Post,
            path: self.dialect.cancel_path.clone(),
            body,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
