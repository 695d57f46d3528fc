//! Shopify order export rows to a historical NewStore `fulfill_order` body.

use super::{BackfillTransformer, HistoricalOrder};
use crate::domain::model::Row;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};

/// Units on a single line item; anything above is a broken export row.
pub const MAX_LINE_QUANTITY: f64 = 1000.0;

const NOTIFICATION_BLACKLIST: [&str; 8] = [
    "invoice_created",
    "refund_note_created",
    "order_pending",
    "shipment_cancelled",
    "shipment_dispatched",
    "shipment_delayed",
    "order_cancelled",
    "in_store.ready_for_pick_up",
];

#[derive(Debug, Clone)]
pub struct OrderTransformerConfig {
    pub shop: String,
    pub channel_name: String,
    pub shop_locale: String,
    pub customer_language: String,
    pub default_fulfillment_node: String,
    pub payment_processor: String,
}

impl Default for OrderTransformerConfig {
    fn default() -> Self {
        Self {
            shop: "storefront-catalog-en".to_string(),
            channel_name: "magento".to_string(),
            shop_locale: "en-US".to_string(),
            customer_language: "en".to_string(),
            default_fulfillment_node: "MTLDC1".to_string(),
            payment_processor: "adyen_historical".to_string(),
        }
    }
}

/// Rounds to cents the way a `%.2f` round-trip does.
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// `2021-01-05 10:00:00 -0500` becomes `2021-01-05T10:00:00-05:00`.
pub fn format_date(date: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_str(date.trim(), "%Y-%m-%d %H:%M:%S %z") {
        return parsed.to_rfc3339();
    }
    let mut parts = date.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(day), Some(time)) => format!("{}T{}{}", day, time, parts.collect::<String>()),
        _ => date.replace(' ', ""),
    }
}

fn text<'r>(row: &'r Row, column: &str) -> &'r str {
    row.get(column).map(String::as_str).unwrap_or_default()
}

fn required<'r>(row: &'r Row, column: &str) -> Result<&'r str> {
    row.get(column)
        .map(String::as_str)
        .ok_or_else(|| IntegrationError::processing(format!("missing column '{}'", column)))
}

fn number(row: &Row, column: &str) -> Result<f64> {
    let raw = required(row, column)?;
    raw.trim()
        .parse()
        .map_err(|_| IntegrationError::processing(format!("column '{}' is not a number: {}", column, raw)))
}

fn number_or_zero(row: &Row, column: &str) -> Result<f64> {
    if row.contains_key(column) {
        number(row, column)
    } else {
        Ok(0.0)
    }
}

/// Unit price and per-unit discount of a line item.
struct LinePricing {
    quantity: usize,
    unit_price: f64,
    unit_discount: f64,
    discounted: bool,
}

impl LinePricing {
    fn of(item: &Row) -> Result<Self> {
        let original_price = number_or_zero(item, "Lineitem compare at price")?;
        let price = number(item, "Lineitem price")?;
        let quantity = number(item, "Lineitem quantity")?.trunc();
        if !(1.0..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(IntegrationError::processing(format!("invalid line item quantity {}", quantity)));
        }

        let discounted = original_price > price;
        let unit_price = round2(original_price.max(price) / quantity);
        let unit_discount = if discounted {
            round2((original_price - price) / quantity)
        } else {
            0.0
        };

        Ok(Self {
            quantity: quantity as usize,
            unit_price,
            unit_discount,
            discounted,
        })
    }

    fn adjusted_unit_price(&self) -> f64 {
        self.unit_price - self.unit_discount
    }
}

pub struct OrderTransformer {
    config: OrderTransformerConfig,
}

impl OrderTransformer {
    pub fn new(config: OrderTransformerConfig) -> Self {
        Self { config }
    }

    fn is_store_order(order: &HistoricalOrder) -> bool {
        !text(&order.details, "Billing Company").is_empty()
    }

    /// Sum of discounted unit prices over every unit of the order.
    pub fn order_total(order: &HistoricalOrder) -> Result<f64> {
        let mut total = 0.0;
        for item in &order.items {
            let pricing = LinePricing::of(item)?;
            for _ in 0..pricing.quantity {
                total += pricing.adjusted_unit_price();
            }
        }
        Ok(total)
    }

    fn address(order: &HistoricalOrder, prefix: &str) -> Value {
        let field = |name: &str| text(&order.details, &format!("{} {}", prefix, name)).to_string();
        json!({
            "first_name": field("First Name"),
            "last_name": field("Last Name"),
            "address_line_1": field("Address1"),
            "city": field("City"),
            "state": field("Province Code"),
            "zip_code": field("Zip"),
            "country": field("Country Code"),
        })
    }

    fn payments(&self, order: &HistoricalOrder) -> Result<Value> {
        Ok(json!([{
            "processor": self.config.payment_processor,
            "correlation_ref": "correlation_ref",
            "type": "captured",
            "amount": number(&order.payment, "Transaction Amount")?,
            "method": "historical_payment",
            "processed_at": format_date(required(&order.payment, "Transaction Processed At")?),
        }]))
    }

    fn item_tax_lines(order: &HistoricalOrder, item: &Row, quantity: usize) -> Result<Vec<Value>> {
        let country_code = text(&order.details, "Billing Country Code");
        let mut lines = Vec::new();

        for i in 1.. {
            let price_column = format!("Tax {} Price", i);
            if !item.contains_key(&price_column) {
                break;
            }
            lines.push(json!({
                "amount": round2(number(item, &price_column)? / quantity as f64),
                "rate": number(item, &format!("Tax {} Rate", i))?,
                "name": text(item, &format!("Tax {} Title", i)),
                "country_code": country_code,
            }));
        }
        Ok(lines)
    }

    fn items(order: &HistoricalOrder) -> Result<Vec<Value>> {
        let order_discount = number_or_zero(&order.details, "Discount Amount")?;
        let discount_code = order
            .details
            .get("Discount Code")
            .map(String::as_str)
            .unwrap_or("ORDER DISCOUNT");
        let order_total = if order_discount > 0.0 {
            Self::order_total(order)?
        } else {
            0.0
        };

        let mut ns_items = Vec::new();
        for item in &order.items {
            let pricing = LinePricing::of(item)?;
            let sku = required(item, "Lineitem sku")?;
            let tax_lines = Self::item_tax_lines(order, item, pricing.quantity)?;

            for _ in 0..pricing.quantity {
                let mut price = json!({
                    "item_price": pricing.unit_price,
                    "item_list_price": pricing.unit_price,
                    "item_tax_lines": tax_lines,
                });

                if pricing.discounted {
                    price["item_discount_info"] = json!([{
                        "discount_ref": "DISCOUNT",
                        "description": "DISCOUNT",
                        "coupon_code": "DISCOUNT",
                        "type": "fixed",
                        "original_value": pricing.unit_discount,
                        "price_adjustment": pricing.unit_discount,
                    }]);
                }

                if order_discount > 0.0 && order_total > 0.0 {
                    let share = round2(pricing.adjusted_unit_price() / order_total * order_discount);
                    price["item_order_discount_info"] = json!([{
                        "discount_ref": discount_code,
                        "description": discount_code,
                        "coupon_code": discount_code,
                        "type": "fixed",
                        "original_value": order_discount,
                        "price_adjustment": share,
                    }]);
                }

                ns_items.push(json!({
                    "external_item_id": sku,
                    "product_id": sku,
                    "price": price,
                }));
            }
        }
        Ok(ns_items)
    }

    fn shipping_option(&self, order: &HistoricalOrder) -> Result<Value> {
        let store_id = text(&order.details, "Billing Company");
        let is_store_order = Self::is_store_order(order);

        let mut option = json!({
            "price": number(&order.shipping, "Shipping Line Price")?,
            "tax": number_or_zero(&order.shipping, "Shipping Tax 1 Price")?,
            "zip_code": text(&order.details, "Shipping Zip"),
            "country_code": text(&order.details, "Shipping Country Code"),
        });

        if is_store_order {
            option["service_level_identifier"] = json!("IN_STORE_HANDOVER");
            option["shipping_type"] = json!("in_store_handover");
            option["display_name"] = json!("In Store");
            option["fulfillment_node_id"] = json!(store_id);
            option["shipping_carrier"] = json!("historical_carrier");
            option["store_id"] = json!(store_id);
        } else {
            option["service_level_identifier"] = json!("traditional_carrier");
            option["shipping_type"] = json!("traditional_carrier");
            option["display_name"] = json!("Standard delivery");
            option["fulfillment_node_id"] = json!(self.config.default_fulfillment_node);
            option["shipping_carrier"] = json!("traditional_carrier");
            option["routing_strategy"] = json!({"strategy": "default"});
        }
        Ok(option)
    }

    pub fn transform_order(&self, order: &HistoricalOrder) -> Result<Value> {
        let name = required(&order.details, "Name")?;
        tracing::info!("Start transforming order {}", name);

        let is_store_order = Self::is_store_order(order);
        let price_method = if text(&order.details, "Taxes Included") == "FALSE" {
            "tax_excluded"
        } else {
            "tax_included"
        };

        Ok(json!({
            "external_id": name,
            "shop": self.config.shop,
            "store_id": if is_store_order { text(&order.details, "Billing Company") } else { "" },
            "channel_type": if is_store_order { "store" } else { "web" },
            "channel_name": self.config.channel_name,
            "placed_at": format_date(required(&order.details, "Processed At")?),
            "currency": required(&order.details, "Currency")?,
            "customer_name": text(&order.details, "Shipping Name"),
            "customer_email": text(&order.details, "Email"),
            "shop_locale": self.config.shop_locale,
            "customer_language": self.config.customer_language,
            "external_customer_id": text(&order.details, "Mage Customer Id"),
            "is_fulfilled": true,
            "is_historical": true,
            "notification_blacklist": NOTIFICATION_BLACKLIST,
            "price_method": price_method,
            "shipping_address": Self::address(order, "Shipping"),
            "billing_address": Self::address(order, "Billing"),
            "payments": self.payments(order)?,
            "shipments": [{
                "items": Self::items(order)?,
                "historical_shipping_option": self.shipping_option(order)?,
            }],
        }))
    }
}

#[async_trait]
impl BackfillTransformer for OrderTransformer {
    async fn transform(&self, payload: &Value) -> Result<Value> {
        let order: HistoricalOrder = serde_json::from_value(payload.clone())?;
        self.transform_order(&order)
    }
}
