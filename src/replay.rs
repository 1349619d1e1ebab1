//! CSV request files for offline replay.
//!
//! One request per row:
//!
//! ```text
//! action,client_id,client_order_id,ticker_id,side,price,qty
//! new,1,100,0,buy,100.25,10
//! cancel,1,100,0,,,
//! ```
//!
//! Prices are decimals converted to ticks with a caller-supplied scale.

use std::io;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::command::{
    CancelOrder, ClientId, ClientRequest, MarketUpdate, NewOrder, OrderId, Price, Qty, Side,
    TickerId,
};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("row {row}: {reason}")]
    BadRow { row: usize, reason: String },
}

/// Raw CSV row
#[derive(Debug, Deserialize)]
pub struct RequestRow {
    pub action: String,
    pub client_id: ClientId,
    pub client_order_id: OrderId,
    pub ticker_id: TickerId,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub qty: Option<Qty>,
}

impl RequestRow {
    /// Convert raw row to a typed request.
    /// `price_scale` is ticks per unit, e.g. 100 for cents.
    pub fn to_request(&self, price_scale: u64) -> Result<ClientRequest, String> {
        match self.action.to_ascii_lowercase().as_str() {
            "new" => {
                let side = match self.side.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("buy") | Some("bid") => Side::Bid,
                    Some("sell") | Some("ask") => Side::Ask,
                    other => return Err(format!("bad side {other:?}")),
                };
                let price = self.price.ok_or("missing price")?;
                let qty = self.qty.ok_or("missing qty")?;

                Ok(ClientRequest::New(NewOrder {
                    client_id: self.client_id,
                    client_order_id: self.client_order_id,
                    ticker_id: self.ticker_id,
                    side,
                    price: to_ticks(price, price_scale)?,
                    qty,
                }))
            }
            "cancel" => Ok(ClientRequest::Cancel(CancelOrder {
                client_id: self.client_id,
                client_order_id: self.client_order_id,
                ticker_id: self.ticker_id,
            })),
            other => Err(format!("unknown action {other:?}")),
        }
    }
}

/// Scale a decimal price to integer ticks; off-tick prices are refused.
fn to_ticks(price: Decimal, price_scale: u64) -> Result<Price, String> {
    let scaled = price
        .checked_mul(Decimal::from(price_scale))
        .ok_or_else(|| format!("price {price} out of range"))?;
    if !scaled.fract().is_zero() {
        return Err(format!("price {price} is not a multiple of 1/{price_scale}"));
    }
    scaled.to_u64().ok_or_else(|| format!("price {price} out of range"))
}

/// Read every request from a CSV source with a header row.
pub fn read_requests<R: io::Read>(reader: R, price_scale: u64) -> Result<Vec<ClientRequest>, ReplayError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut requests = Vec::new();
    for (n, row) in reader.deserialize::<RequestRow>().enumerate() {
        let row = row?;
        let request = row
            .to_request(price_scale)
            .map_err(|reason| ReplayError::BadRow { row: n + 1, reason })?;
        requests.push(request);
    }

    Ok(requests)
}

/// Write a market-data stream as CSV, one update per row.
pub fn write_updates<W: io::Write>(
    writer: W,
    updates: impl IntoIterator<Item = MarketUpdate>,
) -> Result<(), ReplayError> {
    let mut writer = csv::Writer::from_writer(writer);
    for update in updates {
        writer.serialize(update)?;
    }
    writer.flush()?;
    Ok(())
}
