//! Menu entities as stored by the REST document store.
//!
//! Field names follow the store's camelCase JSON. Identifiers are opaque
//! strings; numeric ids written by older store versions are accepted and
//! kept in their decimal form.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncError;
use crate::store::paths;

/// Prefix reserved for locally generated ids of entities not yet persisted.
/// The store never issues ids in this namespace.
pub const PLACEHOLDER_PREFIX: &str = "pending:";

/// Generate a fresh placeholder id tagged with the entity type.
pub fn placeholder_id(tag: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{tag}:{}", Uuid::new_v4().simple())
}

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

/// An identified member of one of the store's collections.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Singular name used in logs and errors.
    const KIND: &'static str;
    /// Collection path on the store.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal, $collection:expr) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

impl_entity!(Branch, "branch", paths::BRANCHES);
impl_entity!(Category, "category", paths::CATEGORIES);
impl_entity!(Dish, "dish", paths::DISHES);

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn de_sort_order<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    // Hand-edited db.json files sometimes carry `3.0`.
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| is_integral_i64(*f)).map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid sortOrder {n}"))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected numeric sortOrder, got {other}"
        ))),
    }
}

/// Whole and inside the `i64` range; `as` would silently saturate otherwise.
fn is_integral_i64(f: f64) -> bool {
    // 2^63 is exactly representable and is the first value past i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)
}

// ---------------------------------------------------------------------------
// Branding
// ---------------------------------------------------------------------------

/// Restaurant-wide look and copy. A singleton replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub restaurant_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slogan: Option<String>,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_image_url: Option<String>,
    #[serde(default)]
    pub primary_color: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub card_color: String,
    #[serde(default)]
    pub text_color: String,
    #[serde(default)]
    pub muted_color: String,
    #[serde(default)]
    pub accent_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Branch fields submitted on create; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl NewBranch {
    pub fn into_branch(self, id: String) -> Branch {
        Branch {
            id,
            name: self.name,
            address: self.address,
            phone: self.phone,
            custom_color: self.custom_color,
            logo_url: self.logo_url,
        }
    }
}

impl Branch {
    /// Name, address and phone are required by the admin form.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (field, value) in [
            ("name", &self.name),
            ("address", &self.address),
            ("phone", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::invalid("branch", format!("{field} is required")));
            }
        }
        Ok(())
    }

    /// Case-insensitive substring match on name or address.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.address.to_lowercase().contains(&needle)
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryViewType {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "de_sort_order")]
    pub sort_order: i64,
    #[serde(default)]
    pub view_type: CategoryViewType,
}

impl Category {
    pub fn validate(&self) -> Result<(), SyncError> {
        validate_category_name(&self.name)
    }
}

pub fn validate_category_name(name: &str) -> Result<(), SyncError> {
    if name.trim().is_empty() {
        return Err(SyncError::invalid("category", "name is required"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dishes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishVariant {
    pub name: String,
    pub price: f64,
}

/// How a dish is priced.
#[derive(Debug, Clone, PartialEq)]
pub enum Pricing {
    /// A single price; any stored variants are cleared.
    Fixed(f64),
    /// Per-variant prices; the dish price is the cheapest variant.
    Variants(Vec<DishVariant>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub category_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub variants: Vec<DishVariant>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    /// Empty means the dish is offered at every branch.
    #[serde(default)]
    pub available_branch_ids: Vec<String>,
    #[serde(default, deserialize_with = "de_sort_order")]
    pub sort_order: i64,
}

/// Dish fields submitted on create; the store assigns the id and the
/// synchronizer assigns the sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDish {
    pub category_id: String,
    pub name: String,
    pub description: String,
    pub pricing: Pricing,
    pub image_urls: Vec<String>,
    pub badges: Vec<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub available_branch_ids: Vec<String>,
}

impl NewDish {
    pub fn new(category_id: impl Into<String>, name: impl Into<String>, pricing: Pricing) -> Self {
        Self {
            category_id: category_id.into(),
            name: name.into(),
            description: String::new(),
            pricing,
            image_urls: Vec::new(),
            badges: Vec::new(),
            is_active: true,
            is_featured: false,
            available_branch_ids: Vec::new(),
        }
    }

    pub fn into_dish(self, id: String, sort_order: i64) -> Dish {
        Dish {
            id,
            category_id: self.category_id,
            name: self.name,
            description: self.description,
            price: 0.0,
            image_urls: self.image_urls,
            variants: Vec::new(),
            badges: self.badges,
            is_active: self.is_active,
            is_featured: self.is_featured,
            available_branch_ids: self.available_branch_ids,
            sort_order,
        }
        .with_pricing(self.pricing)
    }
}

impl Dish {
    /// Replace price and variants from a pricing choice.
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        match pricing {
            Pricing::Fixed(price) => {
                self.price = price;
                self.variants.clear();
            }
            Pricing::Variants(variants) => {
                self.variants = variants;
                self.sync_variant_price();
            }
        }
        self
    }

    /// Keep `price` equal to the cheapest variant when variants exist.
    pub fn sync_variant_price(&mut self) {
        if let Some(min) = min_variant_price(&self.variants) {
            self.price = min;
        }
    }

    pub fn pricing(&self) -> Pricing {
        if self.variants.is_empty() {
            Pricing::Fixed(self.price)
        } else {
            Pricing::Variants(self.variants.clone())
        }
    }

    pub fn is_available_at(&self, branch_id: &str) -> bool {
        is_available(self, branch_id)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::invalid("dish", "name is required"));
        }
        if self.category_id.trim().is_empty() {
            return Err(SyncError::invalid("dish", "category is required"));
        }
        validate_price(self.price)?;
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(SyncError::invalid("dish", "variant name is required"));
            }
            validate_price(variant.price)?;
        }
        Ok(())
    }
}

impl Pricing {
    pub fn validate(&self) -> Result<(), SyncError> {
        match self {
            Self::Fixed(price) => validate_price(*price),
            Self::Variants(variants) if variants.is_empty() => Err(SyncError::invalid(
                "dish",
                "variant pricing needs at least one variant",
            )),
            Self::Variants(variants) => variants.iter().try_for_each(|v| validate_price(v.price)),
        }
    }
}

fn validate_price(price: f64) -> Result<(), SyncError> {
    if !price.is_finite() || price < 0.0 {
        return Err(SyncError::invalid(
            "dish",
            format!("price must be a non-negative number, got {price}"),
        ));
    }
    Ok(())
}

pub fn min_variant_price(variants: &[DishVariant]) -> Option<f64> {
    variants.iter().map(|v| v.price).reduce(f64::min)
}

/// A dish is available at a branch when it lists no branches at all, or
/// lists that branch.
pub fn is_available(dish: &Dish, branch_id: &str) -> bool {
    dish.available_branch_ids.is_empty()
        || dish.available_branch_ids.iter().any(|id| id == branch_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dish(branches: &[&str]) -> Dish {
        NewDish {
            available_branch_ids: branches.iter().map(|s| s.to_string()).collect(),
            ..NewDish::new("c1", "Plov", Pricing::Fixed(30000.0))
        }
        .into_dish("d1".into(), 0)
    }

    fn variant(name: &str, price: f64) -> DishVariant {
        DishVariant {
            name: name.into(),
            price,
        }
    }

    #[test]
    fn availability_defaults_to_all_branches() {
        let d = dish(&[]);
        assert!(is_available(&d, "b1"));
        assert!(is_available(&d, "anything"));
    }

    #[test]
    fn availability_respects_branch_list() {
        let d = dish(&["b1", "b3"]);
        assert!(d.is_available_at("b1"));
        assert!(d.is_available_at("b3"));
        assert!(!d.is_available_at("b2"));
    }

    #[test]
    fn variant_pricing_uses_cheapest_variant() {
        let d = NewDish::new(
            "c1",
            "Compote",
            Pricing::Variants(vec![variant("0.5L", 15000.0), variant("1L", 25000.0)]),
        )
        .into_dish("d1".into(), 0);
        assert_eq!(d.price, 15000.0);
        assert_eq!(d.variants.len(), 2);
    }

    #[test]
    fn fixed_pricing_clears_variants() {
        let d = NewDish::new("c1", "Tea", Pricing::Variants(vec![variant("S", 5.0)]))
            .into_dish("d1".into(), 0)
            .with_pricing(Pricing::Fixed(7.0));
        assert!(d.variants.is_empty());
        assert_eq!(d.price, 7.0);
        assert_eq!(d.pricing(), Pricing::Fixed(7.0));
    }

    #[test]
    fn empty_variant_pricing_is_rejected() {
        assert!(Pricing::Variants(vec![]).validate().is_err());
        assert!(Pricing::Fixed(-1.0).validate().is_err());
        assert!(Pricing::Fixed(f64::NAN).validate().is_err());
        assert!(Pricing::Fixed(0.0).validate().is_ok());
    }

    #[test]
    fn dish_decodes_store_json_with_missing_optionals() {
        let d: Dish = serde_json::from_value(serde_json::json!({
            "id": 7,
            "categoryId": "c1",
            "name": "Somsa",
            "description": "",
            "price": 8000,
            "imageUrls": [],
            "isActive": true,
            "sortOrder": 2.0
        }))
        .unwrap();
        assert_eq!(d.id, "7");
        assert_eq!(d.sort_order, 2);
        assert!(d.variants.is_empty());
        assert!(d.available_branch_ids.is_empty());
        assert!(!d.is_featured);
    }

    #[test]
    fn dish_serializes_camel_case() {
        let v = serde_json::to_value(dish(&["b1"])).unwrap();
        assert_eq!(v["categoryId"], "c1");
        assert_eq!(v["availableBranchIds"][0], "b1");
        assert_eq!(v["isActive"], true);
        assert!(v.get("category_id").is_none());
    }

    #[test]
    fn sort_order_accepts_whole_floats_and_rejects_huge_ones() {
        let c: Category =
            serde_json::from_value(json!({ "id": 1, "name": "Mains", "sortOrder": 3.0 })).unwrap();
        assert_eq!(c.sort_order, 3);
        let c: Category =
            serde_json::from_value(json!({ "id": 1, "name": "Mains", "sortOrder": null })).unwrap();
        assert_eq!(c.sort_order, 0);

        for bad in [json!(1e20), json!(-1e20), json!(2.5), json!(u64::MAX)] {
            let parsed = serde_json::from_value::<Category>(
                json!({ "id": 1, "name": "Mains", "sortOrder": bad.clone() }),
            );
            assert!(parsed.is_err(), "accepted sortOrder {bad}");
        }
    }

    #[test]
    fn category_view_type_is_lowercase() {
        let c: Category = serde_json::from_value(serde_json::json!({
            "id": "c1", "name": "Drinks", "sortOrder": 0, "viewType": "list"
        }))
        .unwrap();
        assert_eq!(c.view_type, CategoryViewType::List);
        assert_eq!(serde_json::to_value(c).unwrap()["viewType"], "list");
    }

    #[test]
    fn placeholder_ids_are_unique_and_tagged() {
        let a = placeholder_id("dish");
        let b = placeholder_id("dish");
        assert_ne!(a, b);
        assert!(is_placeholder_id(&a));
        assert!(a.starts_with("pending:dish:"));
        assert!(!is_placeholder_id("42"));
    }

    #[test]
    fn branch_validation_and_search() {
        let b = NewBranch {
            name: "Chilonzor".into(),
            address: "Bunyodkor 12".into(),
            phone: "+998 71 000 00 00".into(),
            ..Default::default()
        }
        .into_branch("b1".into());
        assert!(b.validate().is_ok());
        assert!(b.matches("chil"));
        assert!(b.matches("BUNYOD"));
        assert!(!b.matches("yunusobod"));

        let blank = Branch {
            phone: "  ".into(),
            ..b
        };
        assert!(matches!(
            blank.validate(),
            Err(SyncError::Invalid { entity: "branch", .. })
        ));
    }
}
