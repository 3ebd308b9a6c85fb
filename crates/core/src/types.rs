use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fourteen columns every ingested table must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 14] = [
    "date",
    "name",
    "platform",
    "campaign",
    "category",
    "gender",
    "reach",
    "followers",
    "likes",
    "comments",
    "orders",
    "revenue",
    "total_payout",
    "basis",
];

/// Row-oriented table as delivered by the upstream file parser. Every cell is
/// still text; typing happens in the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// How an influencer is paid for a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayoutBasis {
    PerPost,
    PerOrder,
}

impl PayoutBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutBasis::PerPost => "per-post",
            PayoutBasis::PerOrder => "per-order",
        }
    }
}

impl fmt::Display for PayoutBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated influencer-campaign row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub name: String,
    pub platform: String,
    pub campaign: String,
    pub category: String,
    pub gender: String,
    pub reach: u64,
    pub followers: u64,
    pub likes: u64,
    pub comments: u64,
    pub orders: u64,
    pub revenue: f64,
    pub total_payout: f64,
    pub basis: PayoutBasis,
}

impl Record {
    /// Value of a categorical dimension for this row.
    pub fn dimension_str(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Platform => &self.platform,
            Dimension::Campaign => &self.campaign,
            Dimension::Category => &self.category,
            Dimension::Gender => &self.gender,
            Dimension::Influencer => &self.name,
            Dimension::Basis => self.basis.as_str(),
        }
    }
}

/// Categorical columns a record can be filtered or grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Platform,
    Campaign,
    Category,
    Gender,
    Influencer,
    Basis,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Platform,
        Dimension::Campaign,
        Dimension::Category,
        Dimension::Gender,
        Dimension::Influencer,
        Dimension::Basis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Platform => "platform",
            Dimension::Campaign => "campaign",
            Dimension::Category => "category",
            Dimension::Gender => "gender",
            Dimension::Influencer => "influencer",
            Dimension::Basis => "basis",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted || (wanted == "name" && *d == Dimension::Influencer))
            .ok_or_else(|| format!("unknown dimension '{s}'"))
    }
}

/// A row excluded during validation, with the offending cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRejection {
    /// 1-based index among the data rows (header excluded).
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} column '{}' value '{}': {}",
            self.row, self.column, self.value, self.reason
        )
    }
}

/// A filter value that does not occur in the population it was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterWarning {
    pub dimension: String,
    pub value: String,
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' does not occur in the dataset",
            self.dimension, self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            name: "Influencer 1".to_string(),
            platform: "Instagram".to_string(),
            campaign: "Spring".to_string(),
            category: "Beauty".to_string(),
            gender: "Female".to_string(),
            reach: 10_000,
            followers: 11_000,
            likes: 350,
            comments: 40,
            orders: 27,
            revenue: 22_000.0,
            total_payout: 2_000.0,
            basis: PayoutBasis::PerPost,
        }
    }

    #[test]
    fn test_dimension_lookup() {
        let record = sample();
        assert_eq!(record.dimension_str(Dimension::Platform), "Instagram");
        assert_eq!(record.dimension_str(Dimension::Influencer), "Influencer 1");
        assert_eq!(record.dimension_str(Dimension::Basis), "per-post");
    }

    #[test]
    fn test_dimension_from_str() {
        assert_eq!("Platform".parse::<Dimension>(), Ok(Dimension::Platform));
        assert_eq!("name".parse::<Dimension>(), Ok(Dimension::Influencer));
        assert!("region".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_basis_serde_is_kebab_case() {
        let json = serde_json::to_string(&PayoutBasis::PerOrder).unwrap();
        assert_eq!(json, "\"per-order\"");
    }

    #[test]
    fn test_raw_table_push_row() {
        let mut table = RawTable::new(vec!["a".to_string(), "b".to_string()]);
        table.push_row(["1", "2"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0], vec!["1".to_string(), "2".to_string()]);
    }
}
