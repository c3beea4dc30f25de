//! crates/pickup_core/src/pricing.rs
//!
//! Resolves one cart line from a product definition and the customer's choices:
//! the final price, the human-readable name, and whether every required choice
//! was made.

use crate::domain::{Customization, OptionKind, OrderItem, Product, Selection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Choices that reference things the product does not offer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("'{product}' has no option '{key}'")]
    UnknownOption { product: String, key: String },
    #[error("'{choice}' is not a choice for option '{key}'")]
    UnknownChoice { key: String, choice: String },
    #[error("option '{key}' takes a single choice")]
    ExpectedSingle { key: String },
    #[error("option '{key}' takes a list of choices")]
    ExpectedMulti { key: String },
    #[error("'{0}' is not on the salad list")]
    UnknownSalad(String),
    #[error("salad '{0}' was selected twice")]
    DuplicateSalad(String),
}

/// Why an otherwise well-formed line cannot be added to the cart yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineIssue {
    MissingRequired { key: String, label: String },
    TooFewSalads { required: u32, selected: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLine {
    pub final_price: Decimal,
    pub display_name: String,
    pub is_valid: bool,
    pub issues: Vec<LineIssue>,
    /// The choices that were actually applied; `None` for non-configurable products.
    #[serde(skip)]
    pub customization: Option<Customization>,
}

impl ResolvedLine {
    pub fn into_order_item(self, product: &Product) -> OrderItem {
        let display_name = (self.display_name != product.name).then_some(self.display_name);
        OrderItem {
            product_id: Some(product.id),
            name: product.name.clone(),
            display_name,
            price: self.final_price,
            custom: self.customization,
        }
    }
}

/// Resolves a line for `product`.
///
/// Non-configurable products resolve to their base price and name whatever the
/// arguments. Salads are only considered when the product has them enabled.
pub fn resolve_line(
    product: &Product,
    salads: &[String],
    selections: &BTreeMap<String, Selection>,
) -> Result<ResolvedLine, PricingError> {
    if !product.is_configurable() {
        return Ok(ResolvedLine {
            final_price: product.price,
            display_name: product.name.clone(),
            is_valid: true,
            issues: Vec::new(),
            customization: None,
        });
    }

    let options = product.options();
    if let Some(key) = selections
        .keys()
        .find(|key| !options.iter().any(|o| &o.key == *key))
    {
        return Err(PricingError::UnknownOption {
            product: product.name.clone(),
            key: key.clone(),
        });
    }

    let mut issues = Vec::new();
    let mut summary = Vec::new();
    let mut applied = BTreeMap::new();

    for option in options {
        let chosen = selections.get(&option.key).filter(|s| !s.is_empty());
        let Some(chosen) = chosen else {
            if option.required {
                issues.push(LineIssue::MissingRequired {
                    key: option.key.clone(),
                    label: option.label.clone(),
                });
            }
            continue;
        };

        match (option.kind, chosen) {
            (OptionKind::Single, Selection::Many(_)) => {
                return Err(PricingError::ExpectedSingle {
                    key: option.key.clone(),
                })
            }
            (OptionKind::Multi, Selection::One(_)) => {
                return Err(PricingError::ExpectedMulti {
                    key: option.key.clone(),
                })
            }
            _ => {}
        }

        let values = chosen.values();
        if let Some(bad) = values.iter().find(|v| !option.items.iter().any(|i| i == *v)) {
            return Err(PricingError::UnknownChoice {
                key: option.key.clone(),
                choice: bad.to_string(),
            });
        }

        summary.push(format!("{}: {}", option.label, values.join(", ")));
        applied.insert(option.key.clone(), chosen.clone());
    }

    let mut surcharge = Decimal::ZERO;
    let mut applied_salads = Vec::new();
    if let Some(config) = product.salads() {
        for (i, salad) in salads.iter().enumerate() {
            if !config.items.contains(salad) {
                return Err(PricingError::UnknownSalad(salad.clone()));
            }
            if salads[..i].contains(salad) {
                return Err(PricingError::DuplicateSalad(salad.clone()));
            }
        }

        let selected = salads.len() as u32;
        if selected < config.included {
            issues.push(LineIssue::TooFewSalads {
                required: config.included,
                selected,
            });
        }
        let extra = selected.saturating_sub(config.included);
        surcharge = config.extra_price * Decimal::from(extra);

        if !salads.is_empty() {
            summary.push(format!("Salads: {}", salads.join(", ")));
        }
        applied_salads = salads.to_vec();
    }

    let display_name = if summary.is_empty() {
        product.name.clone()
    } else {
        format!("{} ({})", product.name, summary.join(" • "))
    };

    Ok(ResolvedLine {
        final_price: (product.price + surcharge).round_dp(2),
        display_name,
        is_valid: issues.is_empty(),
        issues,
        customization: Some(Customization {
            selections: applied,
            salads: applied_salads,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OptionDef, ProductConfig, SaladConfig};
    use chrono::Utc;
    use uuid::Uuid;

    fn product(config: Option<ProductConfig>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Menu of the day".to_string(),
            price: Decimal::new(850, 2),
            active: true,
            category: Some("Menus".to_string()),
            config,
            created_at: Utc::now(),
        }
    }

    fn salad_menu() -> Product {
        product(Some(ProductConfig {
            salads: Some(SaladConfig {
                enabled: true,
                included: 2,
                extra_price: Decimal::new(70, 2),
                items: ["Coleslaw", "Beetroot", "Tomato", "Cucumber", "Carrot"]
                    .map(String::from)
                    .to_vec(),
            }),
            options: Vec::new(),
        }))
    }

    fn bread_option(required: bool) -> OptionDef {
        OptionDef {
            key: "bread".to_string(),
            label: "Bread".to_string(),
            kind: OptionKind::Single,
            required,
            items: vec!["White".to_string(), "Rye".to_string()],
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extra_salads_are_charged() {
        let line = resolve_line(
            &salad_menu(),
            &names(&["Coleslaw", "Beetroot", "Tomato", "Carrot"]),
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(line.is_valid);
        assert_eq!(line.final_price, Decimal::new(850 + 140, 2));
        assert_eq!(
            line.display_name,
            "Menu of the day (Salads: Coleslaw, Beetroot, Tomato, Carrot)"
        );
    }

    #[test]
    fn too_few_salads_is_invalid() {
        let line = resolve_line(&salad_menu(), &names(&["Tomato"]), &BTreeMap::new()).unwrap();
        assert!(!line.is_valid);
        assert_eq!(line.final_price, Decimal::new(850, 2));
        assert_eq!(
            line.issues,
            vec![LineIssue::TooFewSalads {
                required: 2,
                selected: 1
            }]
        );
    }

    #[test]
    fn salads_must_come_from_the_list_once() {
        let menu = salad_menu();
        assert_eq!(
            resolve_line(&menu, &names(&["Kale", "Tomato"]), &BTreeMap::new()),
            Err(PricingError::UnknownSalad("Kale".to_string()))
        );
        assert_eq!(
            resolve_line(&menu, &names(&["Tomato", "Tomato"]), &BTreeMap::new()),
            Err(PricingError::DuplicateSalad("Tomato".to_string()))
        );
    }

    #[test]
    fn required_single_option() {
        let sandwich = product(Some(ProductConfig {
            salads: None,
            options: vec![bread_option(true)],
        }));

        let missing = resolve_line(&sandwich, &[], &BTreeMap::new()).unwrap();
        assert!(!missing.is_valid);

        let blank = BTreeMap::from([("bread".to_string(), Selection::One(String::new()))]);
        assert!(!resolve_line(&sandwich, &[], &blank).unwrap().is_valid);

        let chosen = BTreeMap::from([("bread".to_string(), Selection::One("Rye".to_string()))]);
        let line = resolve_line(&sandwich, &[], &chosen).unwrap();
        assert!(line.is_valid);
        assert_eq!(line.final_price, sandwich.price);
        assert_eq!(line.display_name, "Menu of the day (Bread: Rye)");
    }

    #[test]
    fn multi_options_and_salads_share_the_summary() {
        let mut menu = salad_menu();
        if let Some(config) = menu.config.as_mut() {
            config.options.push(OptionDef {
                key: "sauces".to_string(),
                label: "Sauces".to_string(),
                kind: OptionKind::Multi,
                required: true,
                items: names(&["Garlic", "Chili", "Ketchup"]),
            });
        }

        let empty = BTreeMap::from([("sauces".to_string(), Selection::Many(Vec::new()))]);
        let line = resolve_line(&menu, &names(&["Tomato", "Carrot"]), &empty).unwrap();
        assert!(!line.is_valid);

        let chosen = BTreeMap::from([(
            "sauces".to_string(),
            Selection::Many(names(&["Garlic", "Chili"])),
        )]);
        let line = resolve_line(&menu, &names(&["Tomato", "Carrot"]), &chosen).unwrap();
        assert!(line.is_valid);
        assert_eq!(
            line.display_name,
            "Menu of the day (Sauces: Garlic, Chili • Salads: Tomato, Carrot)"
        );
    }

    #[test]
    fn choices_outside_the_definition_are_errors() {
        let sandwich = product(Some(ProductConfig {
            salads: None,
            options: vec![bread_option(false)],
        }));

        let unknown_key = BTreeMap::from([("cheese".to_string(), Selection::One("Brie".into()))]);
        assert!(matches!(
            resolve_line(&sandwich, &[], &unknown_key),
            Err(PricingError::UnknownOption { .. })
        ));

        let unknown_item = BTreeMap::from([("bread".to_string(), Selection::One("Bagel".into()))]);
        assert!(matches!(
            resolve_line(&sandwich, &[], &unknown_item),
            Err(PricingError::UnknownChoice { .. })
        ));

        let wrong_shape = BTreeMap::from([(
            "bread".to_string(),
            Selection::Many(vec!["Rye".to_string()]),
        )]);
        assert_eq!(
            resolve_line(&sandwich, &[], &wrong_shape),
            Err(PricingError::ExpectedSingle {
                key: "bread".to_string()
            })
        );
    }

    #[test]
    fn optional_option_left_empty_keeps_plain_name() {
        let sandwich = product(Some(ProductConfig {
            salads: None,
            options: vec![bread_option(false)],
        }));
        let line = resolve_line(&sandwich, &[], &BTreeMap::new()).unwrap();
        assert!(line.is_valid);
        assert_eq!(line.display_name, sandwich.name);
        assert!(line.clone().into_order_item(&sandwich).display_name.is_none());
    }

    #[test]
    fn plain_product_ignores_arguments() {
        let plain = product(None);
        let noise = BTreeMap::from([("bread".to_string(), Selection::One("Rye".into()))]);
        let line = resolve_line(&plain, &names(&["Tomato"]), &noise).unwrap();
        assert!(line.is_valid);
        assert_eq!(line.final_price, plain.price);
        assert_eq!(line.display_name, plain.name);
        assert!(line.customization.is_none());

        let disabled = product(Some(ProductConfig {
            salads: Some(SaladConfig {
                enabled: false,
                included: 3,
                extra_price: Decimal::ONE,
                items: Vec::new(),
            }),
            options: Vec::new(),
        }));
        assert!(!disabled.is_configurable());
        let line = resolve_line(&disabled, &names(&["Tomato"]), &BTreeMap::new()).unwrap();
        assert_eq!(line.final_price, disabled.price);
    }
}
