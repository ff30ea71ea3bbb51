use serde::Deserialize;

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Quote data as posted by the client. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuoteSnapshot {
    pub client: Option<ClientInfo>,
    pub project: Option<ProjectInfo>,
    pub services: Option<Vec<ServiceLine>>,
    pub pricing: Option<PricingInfo>,
    pub quote_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceLine {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PricingInfo {
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuote {
    pub quote_number: Option<String>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub project_title: String,
    pub project_description: String,
    pub lines: Vec<PricingLine>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingLine {
    pub name: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
}

fn text(value: Option<&String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl QuoteSnapshot {
    /// Fills every default once so formatting never has to.
    pub fn normalize(&self) -> NormalizedQuote {
        let client = self.client.clone().unwrap_or_default();
        let project = self.project.clone().unwrap_or_default();
        let pricing = self.pricing.clone().unwrap_or_default();

        let lines: Vec<PricingLine> = self
            .services
            .iter()
            .flatten()
            .map(|service| {
                let quantity = finite(service.quantity).unwrap_or(1.0);
                let unit_price = finite(service.unit_price).unwrap_or(0.0);
                PricingLine {
                    name: text(service.name.as_ref()),
                    description: text(service.description.as_ref()),
                    quantity,
                    unit_price,
                    total: quantity * unit_price,
                }
            })
            .collect();

        let subtotal = finite(pricing.subtotal).unwrap_or_else(|| lines.iter().map(|l| l.total).sum());
        let tax = finite(pricing.tax).unwrap_or(0.0);
        let total = finite(pricing.total).unwrap_or(subtotal + tax);
        let currency = pricing
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase();

        NormalizedQuote {
            quote_number: self
                .quote_number
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            client_name: text(client.name.as_ref()),
            client_email: text(client.email.as_ref()),
            client_phone: text(client.phone.as_ref()),
            project_title: text(project.title.as_ref()),
            project_description: project.description.unwrap_or_default(),
            lines,
            subtotal,
            tax,
            total,
            currency,
        }
    }
}

/// `1500` for whole amounts, `12.50` otherwise.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, quantity: Option<f64>, unit_price: Option<f64>) -> ServiceLine {
        ServiceLine {
            name: Some(name.into()),
            description: None,
            quantity,
            unit_price,
        }
    }

    #[test]
    fn row_total_is_quantity_times_unit_price() {
        let snapshot = QuoteSnapshot {
            services: Some(vec![service("Logo", Some(2.0), Some(100.0))]),
            ..Default::default()
        };
        let quote = snapshot.normalize();
        assert_eq!(quote.lines[0].total, 200.0);
        assert_eq!(quote.subtotal, 200.0);
        assert_eq!(quote.total, 200.0);
        assert_eq!(quote.currency, "EUR");
    }

    #[test]
    fn missing_numbers_default_to_one_times_zero() {
        let snapshot = QuoteSnapshot {
            services: Some(vec![service("Conseil", None, None)]),
            ..Default::default()
        };
        let line = &snapshot.normalize().lines[0];
        assert_eq!(line.quantity, 1.0);
        assert_eq!(line.unit_price, 0.0);
        assert_eq!(line.total, 0.0);
    }

    #[test]
    fn explicit_pricing_wins_over_computed_totals() {
        let snapshot = QuoteSnapshot {
            services: Some(vec![service("Site", Some(1.0), Some(1000.0))]),
            pricing: Some(PricingInfo {
                subtotal: None,
                tax: Some(200.0),
                total: None,
                currency: Some("xof".into()),
            }),
            ..Default::default()
        };
        let quote = snapshot.normalize();
        assert_eq!(quote.subtotal, 1000.0);
        assert_eq!(quote.total, 1200.0);
        assert_eq!(quote.currency, "XOF");
    }

    #[test]
    fn empty_snapshot_normalizes_without_panicking() {
        let quote = QuoteSnapshot::default().normalize();
        assert!(quote.lines.is_empty());
        assert_eq!(quote.total, 0.0);
        assert_eq!(quote.client_name, "");
    }

    #[test]
    fn amounts_drop_decimals_only_when_whole() {
        assert_eq!(format_amount(1500.0), "1500");
        assert_eq!(format_amount(12.5), "12.50");
        assert_eq!(format_amount(0.0), "0");
    }
}
