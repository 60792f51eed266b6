//! Invoice data model.
//!
//! The shape stages exchange with each other through the opaque outcome
//! payload. The orchestrator never inspects it; it is defined here so that
//! stage implementations and the callers consuming sealed results agree on
//! one typed representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monetary amounts are compared with this tolerance to absorb float noise
/// from upstream extraction.
const AMOUNT_TOLERANCE: f64 = 0.01;

/// Supported processing regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "APAC")]
    Apac,
    #[serde(rename = "LATAM")]
    Latam,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Eu => "EU",
            Region::Apac => "APAC",
            Region::Latam => "LATAM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "US" => Some(Region::Us),
            "EU" => Some(Region::Eu),
            "APAC" => Some(Region::Apac),
            "LATAM" => Some(Region::Latam),
            _ => None,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status a stage may stamp onto the invoice payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Processing,
    Validated,
    Approved,
    Rejected,
    Error,
}

/// Postal address for a vendor or buyer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [
            self.street.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Individual line item on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub tax_amount: Option<f64>,
}

impl LineItem {
    pub fn validate(&self) -> Result<(), InvoiceValidationError> {
        let expected = self.quantity * self.unit_price;
        if (self.total - expected).abs() > AMOUNT_TOLERANCE {
            return Err(InvoiceValidationError::LineItemTotal {
                description: self.description.clone(),
                total: self.total,
                expected,
            });
        }
        Ok(())
    }
}

/// One tax line applied to the invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxDetail {
    pub tax_type: String,
    pub tax_rate: f64,
    pub taxable_amount: f64,
    pub tax_amount: f64,
}

/// Complete invoice as extracted from a submitted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    pub vendor_name: String,
    #[serde(default)]
    pub vendor_address: Option<Address>,
    #[serde(default)]
    pub vendor_tax_id: Option<String>,
    #[serde(default)]
    pub vendor_email: Option<String>,

    pub buyer_name: String,
    #[serde(default)]
    pub buyer_address: Option<Address>,
    #[serde(default)]
    pub buyer_tax_id: Option<String>,

    pub line_items: Vec<LineItem>,

    pub currency: String,
    pub subtotal: f64,
    #[serde(default)]
    pub tax_details: Vec<TaxDetail>,
    pub total_tax: f64,
    #[serde(default)]
    pub discount_amount: f64,
    pub total_amount: f64,

    pub region: Region,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub source_file: Option<String>,
}

impl Invoice {
    /// Check the arithmetic consistency of the extracted amounts.
    ///
    /// Stage implementations call this after extraction; a mismatch is a
    /// domain failure for the stage, not a reason to panic.
    pub fn validate(&self) -> Result<(), InvoiceValidationError> {
        for item in &self.line_items {
            item.validate()?;
        }

        if !self.line_items.is_empty() {
            let items_total: f64 = self.line_items.iter().map(|i| i.total).sum();
            if (items_total - self.subtotal).abs() > AMOUNT_TOLERANCE {
                return Err(InvoiceValidationError::SubtotalMismatch {
                    items_total,
                    subtotal: self.subtotal,
                });
            }
        }

        let expected_total = self.subtotal + self.total_tax - self.discount_amount;
        if (self.total_amount - expected_total).abs() > AMOUNT_TOLERANCE {
            return Err(InvoiceValidationError::TotalMismatch {
                total: self.total_amount,
                expected: expected_total,
            });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceValidationError {
    #[error("Line item '{description}' total {total} doesn't match quantity * unit_price {expected}")]
    LineItemTotal {
        description: String,
        total: f64,
        expected: f64,
    },

    #[error("Line items total {items_total} doesn't match subtotal {subtotal}")]
    SubtotalMismatch { items_total: f64, subtotal: f64 },

    #[error("Total amount {total} doesn't match calculated total {expected}")]
    TotalMismatch { total: f64, expected: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invoice() -> Invoice {
        Invoice {
            invoice_number: "INV-2026-001".to_string(),
            date: Utc::now(),
            due_date: None,
            vendor_name: "Acme Supplies".to_string(),
            vendor_address: None,
            vendor_tax_id: Some("12-3456789".to_string()),
            vendor_email: None,
            buyer_name: "Globex Corp".to_string(),
            buyer_address: None,
            buyer_tax_id: None,
            line_items: vec![
                LineItem {
                    description: "Widgets".to_string(),
                    quantity: 10.0,
                    unit_price: 12.5,
                    total: 125.0,
                    tax_rate: None,
                    tax_amount: None,
                },
                LineItem {
                    description: "Shipping".to_string(),
                    quantity: 1.0,
                    unit_price: 25.0,
                    total: 25.0,
                    tax_rate: None,
                    tax_amount: None,
                },
            ],
            currency: "USD".to_string(),
            subtotal: 150.0,
            tax_details: vec![],
            total_tax: 12.0,
            discount_amount: 0.0,
            total_amount: 162.0,
            region: Region::Us,
            status: InvoiceStatus::Pending,
            confidence_score: Some(0.92),
            source_file: Some("invoices/acme-001.pdf".to_string()),
        }
    }

    #[test]
    fn test_valid_invoice_passes() {
        assert!(sample_invoice().validate().is_ok());
    }

    #[test]
    fn test_line_item_mismatch_rejected() {
        let mut invoice = sample_invoice();
        invoice.line_items[0].total = 999.0;
        assert!(matches!(
            invoice.validate(),
            Err(InvoiceValidationError::LineItemTotal { .. })
        ));
    }

    #[test]
    fn test_total_mismatch_rejected() {
        let mut invoice = sample_invoice();
        invoice.total_amount = 150.0;
        assert!(matches!(
            invoice.validate(),
            Err(InvoiceValidationError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_region_parse_roundtrip() {
        for region in [Region::Us, Region::Eu, Region::Apac, Region::Latam] {
            assert_eq!(Region::parse(region.as_str()), Some(region));
        }
        assert_eq!(Region::parse("mars"), None);
    }
}
