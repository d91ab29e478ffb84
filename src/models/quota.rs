use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub date: NaiveDate,
    pub count: u32,
}

impl QuotaRecord {
    pub fn fresh(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }

    /// A record from a previous day counts as no usage today.
    pub fn for_day(self, today: NaiveDate) -> Self {
        if self.date == today {
            self
        } else {
            Self::fresh(today)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub date: NaiveDate,
    pub used: u32,
    pub in_flight: u32,
    pub cap: u32,
    pub remaining: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_record_resets() {
        let yesterday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let record = QuotaRecord { date: yesterday, count: 2 };
        assert_eq!(record.for_day(today), QuotaRecord::fresh(today));

        let record = QuotaRecord { date: today, count: 1 };
        assert_eq!(record.for_day(today).count, 1);
    }
}
