use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::domain::{Coordinates, PaperSize, Vendor, VendorCapabilities, VendorId, VendorRates};
use super::repository::{DirectoryError, VendorDirectory};

/// Vendor directory loaded once from a CSV export of the account service.
///
/// Expected headers: `id,name,latitude,longitude,active,open,verified,
/// mono_single,mono_double,color_single,color_double,paper_sizes,color`.
/// Empty rate cells mean the category is not offered; an empty
/// `paper_sizes` cell means no capability descriptor.
#[derive(Debug, Clone, Default)]
pub struct CsvVendorDirectory {
    vendors: Vec<Vendor>,
}

impl CsvVendorDirectory {
    pub fn new(vendors: Vec<Vendor>) -> Self {
        Self { vendors }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| {
            DirectoryError::Unavailable(format!("{}: {err}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DirectoryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut vendors = Vec::new();

        for (index, record) in csv_reader.deserialize::<VendorRow>().enumerate() {
            let row = record
                .map_err(|err| DirectoryError::InvalidRecord(format!("row {}: {err}", index + 1)))?;
            vendors.push(row.into_vendor()?);
        }

        Ok(Self { vendors })
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

impl VendorDirectory for CsvVendorDirectory {
    fn list_all(&self) -> Result<Vec<Vendor>, DirectoryError> {
        Ok(self.vendors.clone())
    }

    fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, DirectoryError> {
        Ok(self.vendors.iter().find(|vendor| &vendor.id == id).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct VendorRow {
    id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    active: bool,
    open: bool,
    verified: bool,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    mono_single: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    mono_double: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    color_single: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    color_double: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    paper_sizes: Option<String>,
    #[serde(default)]
    color: Option<bool>,
}

impl VendorRow {
    fn into_vendor(self) -> Result<Vendor, DirectoryError> {
        let location = Coordinates::new(self.latitude, self.longitude);
        if !location.is_valid() {
            return Err(DirectoryError::InvalidRecord(format!(
                "vendor {} has out-of-range coordinates",
                self.id
            )));
        }

        let rates = VendorRates {
            mono_single: parse_rate(&self.id, self.mono_single.as_deref())?,
            mono_double: parse_rate(&self.id, self.mono_double.as_deref())?,
            color_single: parse_rate(&self.id, self.color_single.as_deref())?,
            color_double: parse_rate(&self.id, self.color_double.as_deref())?,
        };

        let capabilities = match self.paper_sizes.as_deref() {
            Some(raw) => Some(VendorCapabilities {
                paper_sizes: raw
                    .split('|')
                    .map(PaperSize::from_str)
                    .collect::<Result<_, _>>()
                    .map_err(|err| {
                        DirectoryError::InvalidRecord(format!("vendor {}: {err}", self.id))
                    })?,
                color: self.color.unwrap_or(false),
            }),
            None => None,
        };

        Ok(Vendor {
            id: VendorId(self.id),
            name: self.name,
            location,
            active: self.active,
            open: self.open,
            verified: self.verified,
            rates,
            capabilities,
        })
    }
}

fn parse_rate(vendor: &str, raw: Option<&str>) -> Result<Option<Decimal>, DirectoryError> {
    raw.map(|value| {
        let rate = Decimal::from_str(value).map_err(|err| {
            DirectoryError::InvalidRecord(format!("vendor {vendor}: rate '{value}' ({err})"))
        })?;
        if rate.is_sign_negative() {
            return Err(DirectoryError::InvalidRecord(format!(
                "vendor {vendor}: negative rate '{value}'"
            )));
        }
        Ok(rate)
    })
    .transpose()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,name,latitude,longitude,active,open,verified,mono_single,mono_double,color_single,color_double,paper_sizes,color
v-1,Campus Copies,37.5665,126.9780,true,true,true,0.10,0.08,0.50,,A4|Letter,true
v-2,Night Owl Print,37.5700,126.9820,true,false,true,0.12,,,,,
";

    #[test]
    fn parses_rates_and_capabilities() {
        let directory = CsvVendorDirectory::from_reader(SAMPLE.as_bytes()).expect("valid csv");
        assert_eq!(directory.len(), 2);

        let campus = directory
            .find_by_id(&VendorId("v-1".to_string()))
            .expect("lookup")
            .expect("vendor present");
        assert_eq!(campus.rates.mono_single, Some(Decimal::new(10, 2)));
        assert_eq!(campus.rates.color_double, None);
        assert_eq!(
            campus.capabilities,
            Some(VendorCapabilities {
                paper_sizes: vec![PaperSize::A4, PaperSize::Letter],
                color: true,
            })
        );
        assert!(campus.is_available());

        let night = directory
            .find_by_id(&VendorId("v-2".to_string()))
            .expect("lookup")
            .expect("vendor present");
        assert!(night.capabilities.is_none());
        assert!(!night.is_available());
    }

    #[test]
    fn rejects_bad_rates_and_paper_sizes() {
        let bad_rate = "\
id,name,latitude,longitude,active,open,verified,mono_single,mono_double,color_single,color_double,paper_sizes,color
v-9,Broken,37.0,127.0,true,true,true,cheap,,,,,
";
        assert!(matches!(
            CsvVendorDirectory::from_reader(bad_rate.as_bytes()),
            Err(DirectoryError::InvalidRecord(_))
        ));

        let bad_paper = "\
id,name,latitude,longitude,active,open,verified,mono_single,mono_double,color_single,color_double,paper_sizes,color
v-9,Broken,37.0,127.0,true,true,true,0.10,,,,B9,
";
        assert!(matches!(
            CsvVendorDirectory::from_reader(bad_paper.as_bytes()),
            Err(DirectoryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn missing_file_is_unavailable() {
        assert!(matches!(
            CsvVendorDirectory::from_path("/nonexistent/vendors.csv"),
            Err(DirectoryError::Unavailable(_))
        ));
    }
}
