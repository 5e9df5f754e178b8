//! Worksheet row rendering
//!
//! One header row followed by one row per tracker, in [`HEADERS`] order.
//! Bump [`ROW_SCHEMA_VERSION`] whenever a column is added, removed or moved.

use shared::tracker::{Stage, Tracker};
use shared::util::{format_millis, format_rfc3339};

pub const ROW_SCHEMA_VERSION: u32 = 1;

pub const HEADERS: [&str; 23] = [
    "Tracker Code",
    "Tracking ID",
    "Channel ID",
    "Order ID",
    "Sub Order ID",
    "Stage",
    "Status",
    "Courier",
    "Channel Name",
    "G-Code",
    "EAN-Code",
    "Product SKU",
    "Channel Listing ID",
    "Quantity",
    "Amount",
    "Payment Mode",
    "Order Status",
    "Buyer City",
    "Buyer State",
    "Buyer Pincode",
    "Invoice Number",
    "Last Updated",
    "Sync Timestamp",
];

/// Last column letter for the A1 range covering [`HEADERS`]
pub const LAST_COLUMN: &str = "W";

pub type Row = Vec<String>;

/// Furthest stage reached, as shown in the worksheet
pub fn stage_label(tracker: &Tracker) -> &'static str {
    if tracker.cancelled {
        "Dispatch Cancelled"
    } else if tracker.is_stage_complete(Stage::Dispatch) {
        "Dispatch"
    } else if tracker.is_stage_complete(Stage::Packing) {
        "Packing"
    } else {
        "Label"
    }
}

pub fn status_label(tracker: &Tracker) -> &'static str {
    let label = tracker.is_stage_complete(Stage::Label);
    let packing = tracker.is_stage_complete(Stage::Packing);
    let dispatch = tracker.is_stage_complete(Stage::Dispatch);

    if tracker.cancelled {
        "Cancelled"
    } else if dispatch {
        "Dispatched"
    } else if tracker.on_hold && packing {
        "Dispatch Pending"
    } else if tracker.on_hold && label {
        "Packing Hold"
    } else if packing {
        "Packing Scanned"
    } else if label {
        "Packing Pending Shipment"
    } else {
        "Label yet to Scan"
    }
}

fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        amount.to_string()
    }
}

pub fn render_row(tracker: &Tracker, synced_at: &str) -> Row {
    let m = &tracker.metadata;
    vec![
        tracker.tracker_code.clone(),
        m.tracking_id.clone(),
        m.channel_id.clone(),
        m.order_id.clone(),
        m.sub_order_id.clone(),
        stage_label(tracker).to_string(),
        status_label(tracker).to_string(),
        m.courier.clone(),
        m.channel_name.clone(),
        m.g_code.clone(),
        m.ean_code.clone(),
        m.product_sku_code.clone(),
        m.channel_listing_id.clone(),
        m.quantity.to_string(),
        format_amount(m.amount),
        m.payment_mode.clone(),
        m.order_status.clone(),
        m.buyer_city.clone(),
        m.buyer_state.clone(),
        m.buyer_pincode.clone(),
        m.invoice_number.clone(),
        format_millis(tracker.last_updated),
        synced_at.to_string(),
    ]
}

/// Header row plus one row per tracker, stable-sorted by tracker code
pub fn render_rows(trackers: &[Tracker], synced_at_millis: i64) -> Vec<Row> {
    let synced_at = format_rfc3339(synced_at_millis);
    let mut sorted: Vec<&Tracker> = trackers.iter().collect();
    sorted.sort_by(|a, b| a.tracker_code.cmp(&b.tracker_code));

    let mut rows = Vec::with_capacity(sorted.len() + 1);
    rows.push(HEADERS.iter().map(|h| h.to_string()).collect());
    rows.extend(sorted.into_iter().map(|t| render_row(t, &synced_at)));
    rows
}
