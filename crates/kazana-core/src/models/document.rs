use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::contains_ignore_case;

/// Document category assigned by the classifier or edited by the user.
///
/// The service is inconsistent about spelling (`real_estate`, `Real Estate`),
/// so deserialization is lenient and anything unrecognised becomes `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Tax,
    Identity,
    Medical,
    RealEstate,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tax,
        Category::Identity,
        Category::Medical,
        Category::RealEstate,
        Category::Other,
    ];

    /// Wire value
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tax => "tax",
            Category::Identity => "identity",
            Category::Medical => "medical",
            Category::RealEstate => "real_estate",
            Category::Other => "other",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        match normalized.as_str() {
            "tax" => Some(Category::Tax),
            "identity" => Some(Category::Identity),
            "medical" => Some(Category::Medical),
            "real_estate" | "realestate" => Some(Category::RealEstate),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Tax => write!(f, "Tax"),
            Category::Identity => write!(f, "Identity"),
            Category::Medical => write!(f, "Medical"),
            Category::RealEstate => write!(f, "Real Estate"),
            Category::Other => write!(f, "Other"),
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::parse(&value).unwrap_or_default()
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

/// Strict parsing for user input, unlike the lenient wire decoding
impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s).ok_or_else(|| {
            let valid: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
            format!("Unknown category '{}' (expected one of: {})", s, valid.join(", "))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Document {
    pub id: i64,
    /// Stored file path or URL on the service
    pub file: String,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub category: Category,
    /// Classifier confidence in `[0, 1]`
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Last path segment of `file`
    pub fn file_name(&self) -> &str {
        let trimmed = self.file.trim_end_matches('/');
        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
        without_query.rsplit('/').next().unwrap_or(without_query)
    }

    /// Confidence as a percentage with two decimals, e.g. "87.50%"
    pub fn confidence_display(&self) -> String {
        format!("{:.2}%", self.confidence_score * 100.0)
    }

    pub fn uploaded_display(&self) -> String {
        match self.uploaded_at {
            Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            None => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateCategoryRequest {
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentSortColumn {
    File,
    Category,
    Confidence,
    #[default]
    Uploaded,
}

impl FromStr for DocumentSortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "name" => Ok(DocumentSortColumn::File),
            "category" => Ok(DocumentSortColumn::Category),
            "confidence" => Ok(DocumentSortColumn::Confidence),
            "uploaded" | "date" => Ok(DocumentSortColumn::Uploaded),
            _ => Err(format!("Unknown sort column '{}'", s)),
        }
    }
}

/// Narrows a document list for display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub category: Option<Category>,
    /// Case-insensitive substring of the file name
    pub query: Option<String>,
    pub sort: DocumentSortColumn,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(category) = self.category {
            if doc.category != category {
                return false;
            }
        }
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => contains_ignore_case(doc.file_name(), query),
            _ => true,
        }
    }

    /// Matching documents in display order. Newest uploads and highest
    /// confidence come first; file names and categories sort ascending.
    pub fn apply<'a>(&self, docs: &'a [Document]) -> Vec<&'a Document> {
        let mut matched: Vec<&Document> = docs.iter().filter(|d| self.matches(d)).collect();
        matched.sort_by(|a, b| match self.sort {
            DocumentSortColumn::File => a.file_name().to_lowercase().cmp(&b.file_name().to_lowercase()),
            DocumentSortColumn::Category => a
                .category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.file_name().cmp(b.file_name())),
            DocumentSortColumn::Confidence => b
                .confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(Ordering::Equal),
            DocumentSortColumn::Uploaded => b.uploaded_at.cmp(&a.uploaded_at),
        });
        matched
    }
}
