//! Test fixtures
//!
//! A small order domain: customers place orders made of items, each item
//! points at a product, and products collect reviews.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use qspec_core::{
    Entity, EntitySchema, FieldDescriptor, FieldType, RelationDescriptor, Value,
};
use uuid::Uuid;

use crate::includes::Relation;

pub const TIERS: &[&str] = &["Bronze", "Silver", "Gold"];
pub const ORDER_STATUSES: &[&str] = &["Pending", "Shipped", "Delivered", "Cancelled"];

fn customer_schema() -> &'static EntitySchema {
    &CUSTOMER
}

fn product_schema() -> &'static EntitySchema {
    &PRODUCT
}

fn review_schema() -> &'static EntitySchema {
    &REVIEW
}

fn order_item_schema() -> &'static EntitySchema {
    &ORDER_ITEM
}

static CUSTOMER: EntitySchema = EntitySchema {
    name: "Customer",
    fields: &[
        FieldDescriptor::required("Id", FieldType::Integer),
        FieldDescriptor::required("Name", FieldType::String),
        FieldDescriptor::optional("Email", FieldType::String),
        FieldDescriptor::required("Tier", FieldType::Enum(TIERS)),
    ],
    relations: &[],
};

static REVIEW: EntitySchema = EntitySchema {
    name: "Review",
    fields: &[
        FieldDescriptor::required("Id", FieldType::Integer),
        FieldDescriptor::required("Stars", FieldType::Integer),
        FieldDescriptor::required("Body", FieldType::String),
    ],
    relations: &[],
};

static PRODUCT: EntitySchema = EntitySchema {
    name: "Product",
    fields: &[
        FieldDescriptor::required("Id", FieldType::Integer),
        FieldDescriptor::required("Sku", FieldType::Uuid),
        FieldDescriptor::required("Name", FieldType::String),
        FieldDescriptor::optional("Description", FieldType::String),
        FieldDescriptor::required("Price", FieldType::Float),
        FieldDescriptor::required("Featured", FieldType::Boolean),
        FieldDescriptor::required("Rating", FieldType::Float),
        FieldDescriptor::optional("ReleasedOn", FieldType::Date),
        FieldDescriptor::optional("Supplier", FieldType::Object(customer_schema)),
    ],
    relations: &[RelationDescriptor::collection("Reviews", review_schema)],
};

static ORDER_ITEM: EntitySchema = EntitySchema {
    name: "OrderItem",
    fields: &[
        FieldDescriptor::required("Id", FieldType::Integer),
        FieldDescriptor::required("Quantity", FieldType::Integer),
    ],
    relations: &[RelationDescriptor::reference("Product", product_schema)],
};

static ORDER: EntitySchema = EntitySchema {
    name: "Order",
    fields: &[
        FieldDescriptor::required("Id", FieldType::Integer),
        FieldDescriptor::required("Number", FieldType::String),
        FieldDescriptor::required("PlacedAt", FieldType::DateTime),
        FieldDescriptor::required("Status", FieldType::Enum(ORDER_STATUSES)),
        FieldDescriptor::required("Total", FieldType::Float),
        FieldDescriptor::optional("Customer", FieldType::Object(customer_schema)),
    ],
    relations: &[
        RelationDescriptor::reference("Customer", customer_schema),
        RelationDescriptor::collection("Items", order_item_schema),
    ],
};

/// Read a nested value through an optional object
fn nested<E: Entity>(object: &Option<E>, rest: &str) -> Value {
    object.as_ref().map_or(Value::Null, |o| o.value(rest))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub tier: &'static str,
}

impl Entity for Customer {
    fn schema() -> &'static EntitySchema {
        &CUSTOMER
    }

    fn value(&self, path: &str) -> Value {
        match path {
            "Id" => self.id.into(),
            "Name" => self.name.clone().into(),
            "Email" => self.email.clone().into(),
            "Tier" => self.tier.into(),
            _ => Value::Null,
        }
    }
}

impl Customer {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: None,
            tier: "Bronze",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub stars: i64,
    pub body: String,
}

impl Entity for Review {
    fn schema() -> &'static EntitySchema {
        &REVIEW
    }

    fn value(&self, path: &str) -> Value {
        match path {
            "Id" => self.id.into(),
            "Stars" => self.stars.into(),
            "Body" => self.body.clone().into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub sku: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub featured: bool,
    pub rating: f64,
    pub released_on: Option<NaiveDate>,
    pub supplier: Option<Customer>,
    pub reviews: Vec<Review>,
}

impl Entity for Product {
    fn schema() -> &'static EntitySchema {
        &PRODUCT
    }

    fn value(&self, path: &str) -> Value {
        match path {
            "Id" => self.id.into(),
            "Sku" => self.sku.into(),
            "Name" => self.name.clone().into(),
            "Description" => self.description.clone().into(),
            "Price" => self.price.into(),
            "Featured" => self.featured.into(),
            "Rating" => self.rating.into(),
            "ReleasedOn" => self.released_on.into(),
            other => match other.split_once('.') {
                Some(("Supplier", rest)) => nested(&self.supplier, rest),
                _ => Value::Null,
            },
        }
    }
}

impl Product {
    pub fn sample(name: &str, price: f64, featured: bool, rating: f64) -> Self {
        Self {
            id: 0,
            sku: Uuid::nil(),
            name: name.to_string(),
            description: None,
            price,
            featured,
            rating,
            released_on: None,
            supplier: None,
            reviews: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_supplier(mut self, supplier: Customer) -> Self {
        self.supplier = Some(supplier);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub quantity: i64,
    pub product: Option<Product>,
}

impl Entity for OrderItem {
    fn schema() -> &'static EntitySchema {
        &ORDER_ITEM
    }

    fn value(&self, path: &str) -> Value {
        match path {
            "Id" => self.id.into(),
            "Quantity" => self.quantity.into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub number: String,
    pub placed_at: DateTime<Utc>,
    pub status: &'static str,
    pub total: f64,
    pub customer: Option<Customer>,
    pub items: Vec<OrderItem>,
}

impl Entity for Order {
    fn schema() -> &'static EntitySchema {
        &ORDER
    }

    fn value(&self, path: &str) -> Value {
        match path {
            "Id" => self.id.into(),
            "Number" => self.number.clone().into(),
            "PlacedAt" => self.placed_at.into(),
            "Status" => self.status.into(),
            "Total" => self.total.into(),
            other => match other.split_once('.') {
                Some(("Customer", rest)) => nested(&self.customer, rest),
                _ => Value::Null,
            },
        }
    }
}

impl Order {
    pub fn new(id: i64, number: &str, total: f64) -> Self {
        Self {
            id,
            number: number.to_string(),
            placed_at: Utc.timestamp_opt(1_700_000_000 + id * 86_400, 0).unwrap(),
            status: "Pending",
            total,
            customer: None,
            items: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: &'static str) -> Self {
        self.status = status;
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }
}

pub mod relations {
    use super::*;

    pub const ORDER_CUSTOMER: Relation<Order, Customer> = Relation::reference("Customer");
    pub const ORDER_ITEMS: Relation<Order, OrderItem> = Relation::collection("Items");
    pub const ITEM_PRODUCT: Relation<OrderItem, Product> = Relation::reference("Product");
    pub const PRODUCT_REVIEWS: Relation<Product, Review> = Relation::collection("Reviews");
}

/// A mixed product catalogue used across filter and repository tests
pub fn catalogue() -> Vec<Product> {
    vec![
        Product::sample("Blue Widget", 120.0, true, 3.9).with_id(1),
        Product::sample("Red Widget", 80.0, true, 4.8).with_id(2),
        Product::sample("Green Gadget", 150.0, false, 4.7)
            .with_id(3)
            .with_description("Glows in the dark"),
        Product::sample("Yellow Gizmo", 100.0, false, 2.1)
            .with_id(4)
            .with_supplier(Customer::new(9, "Acme Supplies")),
        Product::sample("Purple Doohickey", 40.0, false, 4.9).with_id(5),
    ]
}
