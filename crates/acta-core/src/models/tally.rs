//! Tally-sheet field model: the fixed set of fields and the per-field record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named quantity printed on the tally sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Polling-table code (`ID_Mesa`).
    #[serde(rename = "ID_Mesa")]
    TableCode,
    /// Precinct code (`ID_Recinto`).
    #[serde(rename = "ID_Recinto")]
    PrecinctCode,
    /// Ballot-box sequence number (`numMesa`).
    #[serde(rename = "numMesa")]
    TableNumber,
    /// Reported total of issued ballots (`total`).
    #[serde(rename = "total")]
    TotalIssued,
    /// Ballots found in the box (`totalAnforas`).
    #[serde(rename = "totalAnforas")]
    BallotsUsed,
    /// Ballots left unused (`totalNoUtilizadas`).
    #[serde(rename = "totalNoUtilizadas")]
    BallotsUnused,
    #[serde(rename = "MAS")]
    Mas,
    #[serde(rename = "SUMATE")]
    Sumate,
    #[serde(rename = "VOTEXCHI")]
    Votexchi,
    #[serde(rename = "CHUPACOTO")]
    Chupacoto,
    /// Reported valid votes (`votosValidos`).
    #[serde(rename = "votosValidos")]
    ValidVotes,
    /// Blank ballots (`votosBlancos`).
    #[serde(rename = "votosBlancos")]
    BlankVotes,
    /// Nullified votes (`votosNulos`).
    #[serde(rename = "votosNulos")]
    NullVotes,
}

impl Field {
    /// Every field, in sheet order.
    pub const ALL: [Field; 13] = [
        Field::TableCode,
        Field::PrecinctCode,
        Field::TableNumber,
        Field::TotalIssued,
        Field::BallotsUsed,
        Field::BallotsUnused,
        Field::Mas,
        Field::Sumate,
        Field::Votexchi,
        Field::Chupacoto,
        Field::ValidVotes,
        Field::BlankVotes,
        Field::NullVotes,
    ];

    /// Name used on reports and in catalog files.
    pub fn name(self) -> &'static str {
        match self {
            Field::TableCode => "ID_Mesa",
            Field::PrecinctCode => "ID_Recinto",
            Field::TableNumber => "numMesa",
            Field::TotalIssued => "total",
            Field::BallotsUsed => "totalAnforas",
            Field::BallotsUnused => "totalNoUtilizadas",
            Field::Mas => "MAS",
            Field::Sumate => "SUMATE",
            Field::Votexchi => "VOTEXCHI",
            Field::Chupacoto => "CHUPACOTO",
            Field::ValidVotes => "votosValidos",
            Field::BlankVotes => "votosBlancos",
            Field::NullVotes => "votosNulos",
        }
    }

    /// Codes rather than counts. Their leading zeros are significant.
    pub fn is_identifier(self) -> bool {
        matches!(self, Field::TableCode | Field::PrecinctCode | Field::TableNumber)
    }

    /// Look a field up by its report name.
    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named slot per field.
///
/// Used for raw strings, normalized values and catalog entries alike, so every
/// stage of the pipeline carries exactly one value for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyFields<T> {
    #[serde(rename = "ID_Mesa")]
    pub table_code: T,
    #[serde(rename = "ID_Recinto")]
    pub precinct_code: T,
    #[serde(rename = "numMesa")]
    pub table_number: T,
    #[serde(rename = "total")]
    pub total_issued: T,
    #[serde(rename = "totalAnforas")]
    pub ballots_used: T,
    #[serde(rename = "totalNoUtilizadas")]
    pub ballots_unused: T,
    #[serde(rename = "MAS")]
    pub mas: T,
    #[serde(rename = "SUMATE")]
    pub sumate: T,
    #[serde(rename = "VOTEXCHI")]
    pub votexchi: T,
    #[serde(rename = "CHUPACOTO")]
    pub chupacoto: T,
    #[serde(rename = "votosValidos")]
    pub valid_votes: T,
    #[serde(rename = "votosBlancos")]
    pub blank_votes: T,
    #[serde(rename = "votosNulos")]
    pub null_votes: T,
}

impl<T> TallyFields<T> {
    /// Build a record by computing each slot from its field.
    pub fn from_fn(mut f: impl FnMut(Field) -> T) -> Self {
        Self {
            table_code: f(Field::TableCode),
            precinct_code: f(Field::PrecinctCode),
            table_number: f(Field::TableNumber),
            total_issued: f(Field::TotalIssued),
            ballots_used: f(Field::BallotsUsed),
            ballots_unused: f(Field::BallotsUnused),
            mas: f(Field::Mas),
            sumate: f(Field::Sumate),
            votexchi: f(Field::Votexchi),
            chupacoto: f(Field::Chupacoto),
            valid_votes: f(Field::ValidVotes),
            blank_votes: f(Field::BlankVotes),
            null_votes: f(Field::NullVotes),
        }
    }

    /// Like [`TallyFields::from_fn`], stopping at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(Field) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            table_code: f(Field::TableCode)?,
            precinct_code: f(Field::PrecinctCode)?,
            table_number: f(Field::TableNumber)?,
            total_issued: f(Field::TotalIssued)?,
            ballots_used: f(Field::BallotsUsed)?,
            ballots_unused: f(Field::BallotsUnused)?,
            mas: f(Field::Mas)?,
            sumate: f(Field::Sumate)?,
            votexchi: f(Field::Votexchi)?,
            chupacoto: f(Field::Chupacoto)?,
            valid_votes: f(Field::ValidVotes)?,
            blank_votes: f(Field::BlankVotes)?,
            null_votes: f(Field::NullVotes)?,
        })
    }

    pub fn get(&self, field: Field) -> &T {
        match field {
            Field::TableCode => &self.table_code,
            Field::PrecinctCode => &self.precinct_code,
            Field::TableNumber => &self.table_number,
            Field::TotalIssued => &self.total_issued,
            Field::BallotsUsed => &self.ballots_used,
            Field::BallotsUnused => &self.ballots_unused,
            Field::Mas => &self.mas,
            Field::Sumate => &self.sumate,
            Field::Votexchi => &self.votexchi,
            Field::Chupacoto => &self.chupacoto,
            Field::ValidVotes => &self.valid_votes,
            Field::BlankVotes => &self.blank_votes,
            Field::NullVotes => &self.null_votes,
        }
    }

    pub fn get_mut(&mut self, field: Field) -> &mut T {
        match field {
            Field::TableCode => &mut self.table_code,
            Field::PrecinctCode => &mut self.precinct_code,
            Field::TableNumber => &mut self.table_number,
            Field::TotalIssued => &mut self.total_issued,
            Field::BallotsUsed => &mut self.ballots_used,
            Field::BallotsUnused => &mut self.ballots_unused,
            Field::Mas => &mut self.mas,
            Field::Sumate => &mut self.sumate,
            Field::Votexchi => &mut self.votexchi,
            Field::Chupacoto => &mut self.chupacoto,
            Field::ValidVotes => &mut self.valid_votes,
            Field::BlankVotes => &mut self.blank_votes,
            Field::NullVotes => &mut self.null_votes,
        }
    }

    /// Transform every slot, keeping the field association.
    pub fn map<U>(&self, mut f: impl FnMut(Field, &T) -> U) -> TallyFields<U> {
        TallyFields::from_fn(|field| f(field, self.get(field)))
    }

    /// Iterate over `(field, value)` pairs in sheet order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &T)> + '_ {
        Field::ALL.into_iter().map(move |field| (field, self.get(field)))
    }
}

/// Which pass supplied a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Embedded text layer of the PDF.
    TextLayer,
    /// Character recognition over the rasterized page.
    ImageOcr,
    /// Pre-extracted spreadsheet row.
    Tabular,
}

/// A raw string recovered for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawField {
    pub text: String,
    pub source: FieldSource,
}

impl RawField {
    pub fn new(text: impl Into<String>, source: FieldSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// Raw strings per field; `None` means "not found".
pub type RawTally = TallyFields<Option<RawField>>;

impl RawTally {
    /// Fields no pass has resolved yet.
    pub fn missing(&self) -> Vec<Field> {
        self.iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| field)
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.iter().any(|(_, value)| value.is_none())
    }

    /// Raw text of a field, if resolved.
    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).as_ref().map(|raw| raw.text.as_str())
    }

    /// Number of fields supplied by a given pass.
    pub fn count_from(&self, source: FieldSource) -> usize {
        self.iter()
            .filter(|(_, value)| value.as_ref().is_some_and(|raw| raw.source == source))
            .count()
    }
}

/// A field value after normalization.
///
/// `ZeroFallback` keeps the lenient policy's "unreadable counts as 0" visible
/// instead of folding it into a genuine zero reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Normalized {
    /// The field was read and converted.
    Read(i64),
    /// Lenient policy: unreadable, stored as 0.
    ZeroFallback,
    /// Strict policy, or a field the source never carried.
    Absent,
}

impl Normalized {
    /// Integer used for storage: fallbacks count as 0, absent values have none.
    pub fn value(self) -> Option<i64> {
        match self {
            Normalized::Read(v) => Some(v),
            Normalized::ZeroFallback => Some(0),
            Normalized::Absent => None,
        }
    }

    /// Integer for storage columns that accept no null.
    pub fn or_zero(self) -> i64 {
        self.value().unwrap_or(0)
    }
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalized::Read(v) => write!(f, "{}", v),
            Normalized::ZeroFallback => f.write_str("0 (unread)"),
            Normalized::Absent => f.write_str("absent"),
        }
    }
}

/// Normalized values per field.
pub type NormalizedTally = TallyFields<Normalized>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("Partido1"), None);
    }

    #[test]
    fn test_identifier_fields() {
        let identifiers: Vec<Field> = Field::ALL.into_iter().filter(|f| f.is_identifier()).collect();
        assert_eq!(identifiers, vec![Field::TableCode, Field::PrecinctCode, Field::TableNumber]);
    }

    #[test]
    fn test_get_matches_from_fn() {
        let record = TallyFields::from_fn(|f| f.name().to_string());
        for field in Field::ALL {
            assert_eq!(record.get(field), field.name());
        }
    }

    #[test]
    fn test_missing_fields() {
        let mut raw: RawTally = TallyFields::default();
        assert_eq!(raw.missing().len(), 13);

        *raw.get_mut(Field::Mas) = Some(RawField::new("100", FieldSource::TextLayer));
        assert!(!raw.missing().contains(&Field::Mas));
        assert_eq!(raw.count_from(FieldSource::TextLayer), 1);
        assert_eq!(raw.text(Field::Mas), Some("100"));
    }

    #[test]
    fn test_normalized_value() {
        assert_eq!(Normalized::Read(7).value(), Some(7));
        assert_eq!(Normalized::ZeroFallback.value(), Some(0));
        assert_eq!(Normalized::Absent.value(), None);
        assert_eq!(Normalized::Absent.or_zero(), 0);
    }

    #[test]
    fn test_serialize_uses_report_names() {
        let record = TallyFields::from_fn(|_| 1u8);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ID_Mesa"], 1);
        assert_eq!(json["votosNulos"], 1);
    }
}
