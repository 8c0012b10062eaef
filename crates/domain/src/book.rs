//! Catalog books and their inventory rows.

use chrono::{DateTime, Utc};
use common::BookId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Book genres offered by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    Fantasy,
    SciFi,
    Mystery,
    Thriller,
    Romance,
    Adventure,
    Autobiography,
    SelfHelp,
    Business,
    TrueCrime,
    HealthAndWellness,
    Religion,
}

impl Genre {
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Fantasy => "fantasy",
            Genre::SciFi => "sci-fi",
            Genre::Mystery => "mystery",
            Genre::Thriller => "thriller",
            Genre::Romance => "romance",
            Genre::Adventure => "adventure",
            Genre::Autobiography => "autobiography",
            Genre::SelfHelp => "self-help",
            Genre::Business => "business",
            Genre::TrueCrime => "true-crime",
            Genre::HealthAndWellness => "health-and-wellness",
            Genre::Religion => "religion",
        }
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Genre {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let genre = match s {
            "fantasy" => Genre::Fantasy,
            "sci-fi" => Genre::SciFi,
            "mystery" => Genre::Mystery,
            "thriller" => Genre::Thriller,
            "romance" => Genre::Romance,
            "adventure" => Genre::Adventure,
            "autobiography" => Genre::Autobiography,
            "self-help" => Genre::SelfHelp,
            "business" => Genre::Business,
            "true-crime" => Genre::TrueCrime,
            "health-and-wellness" => Genre::HealthAndWellness,
            "religion" => Genre::Religion,
            other => {
                return Err(DomainError::UnknownVariant {
                    kind: "genre",
                    value: other.to_string(),
                });
            }
        };
        Ok(genre)
    }
}

/// Available stock for one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub book_id: BookId,
    pub quantity: u32,
}

impl Inventory {
    /// Returns true if `requested` units can be taken from stock.
    pub fn can_supply(&self, requested: u32) -> bool {
        requested <= self.quantity
    }
}

/// A catalog book together with its inventory row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub year: String,
    pub description: String,
    pub image: String,
    pub price: Money,
    pub avg_rating: Option<f64>,
    pub purchased: u32,
    pub added_on: DateTime<Utc>,
    pub inventory: Inventory,
}

impl Book {
    /// Units currently in stock.
    pub fn available(&self) -> u32 {
        self.inventory.quantity
    }
}

/// Input for adding a book to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub year: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub price: Money,
    pub quantity: u32,
}

impl NewBook {
    /// Builds the stored book, assigning a fresh id.
    pub fn into_book(self) -> Result<Book, DomainError> {
        if self.price.is_negative() {
            return Err(DomainError::NegativeAmount {
                field: "price",
                amount: self.price,
            });
        }
        let id = BookId::new();
        Ok(Book {
            id,
            title: self.title,
            author: self.author,
            genre: self.genre,
            year: self.year,
            description: self.description,
            image: self.image,
            price: self.price,
            avg_rating: None,
            purchased: 0,
            added_on: Utc::now(),
            inventory: Inventory {
                book_id: id,
                quantity: self.quantity,
            },
        })
    }
}
