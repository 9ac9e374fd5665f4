use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::SampleRecord;

pub const COLLECTION_DATE_LABEL: &str = "Time of Collection";
pub const SIGNED_DATE_LABEL: &str = "Time of Report Signed";
pub const REPORT_DATE_LABEL: &str = "Time of VGH Report";

/// One DRS object as emitted by `seqslab datahub upload`. Only the fields
/// rewritten here are modelled; everything else round-trips untouched.
/// Incoming `metadata` is replaced wholesale, so it is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_methods: Vec<AccessMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccessMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<AccessUrl>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccessUrl {
    pub url: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DescriptorMetadata {
    #[serde(default)]
    pub types: Vec<Value>,
    #[serde(default)]
    pub extra_properties: Vec<ExtraProperty>,
    #[serde(default)]
    pub dates: Vec<DateInfo>,
    #[serde(default)]
    pub alternate_identifiers: Vec<Value>,
    #[serde(default)]
    pub contributors: Vec<Value>,
    #[serde(default)]
    pub licenses: Vec<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExtraProperty {
    pub category: String,
    pub values: Vec<String>,
}

impl ExtraProperty {
    pub fn single(category: &str, value: &str) -> Self {
        Self {
            category: category.to_string(),
            values: vec![value.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DateInfo {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Annotation {
    pub value: String,
}

impl DescriptorMetadata {
    /// Catalogue metadata for a sample. Every property is present even when
    /// its value is empty; dates appear only when known.
    pub fn for_sample(record: &SampleRecord) -> Self {
        let extra_properties = vec![
            ExtraProperty::single("MP_No", record.mp_number()),
            ExtraProperty::single("Path_No", record.path_number()),
            ExtraProperty::single("Patient_Name", &record.patient_name),
            ExtraProperty::single("Tumor_Purity", &record.tumor_purity),
            ExtraProperty::single("Diagnosis", &record.diagnosis),
            ExtraProperty::single("test_item", &record.test_item),
            ExtraProperty::single("Physician", &record.physician),
            ExtraProperty::single("Turn_Around_time", &record.turnaround_time),
        ];

        let dates = [
            (&record.receive_date, COLLECTION_DATE_LABEL),
            (&record.sign_date, SIGNED_DATE_LABEL),
            (&record.report_date, REPORT_DATE_LABEL),
        ]
        .into_iter()
        .filter_map(|(date, label)| {
            date.as_ref().map(|date| DateInfo {
                date: date.clone(),
                kind: Annotation {
                    value: label.to_string(),
                },
            })
        })
        .collect();

        Self {
            extra_properties,
            dates,
            ..Self::default()
        }
    }
}

/// Rewrites every descriptor for `record` and, when the upload produced a
/// single object, collapses it to a folder-level reference.
///
/// Fails with a description of the missing field; the caller attaches the
/// sample identifiers.
pub fn enrich_descriptors(
    descriptors: &mut [UploadDescriptor],
    record: &SampleRecord,
    vendor: &str,
    tags: &[String],
) -> Result<(), String> {
    if descriptors.is_empty() {
        return Err("upload produced no descriptors".to_string());
    }

    let mut all_tags = tags.to_vec();
    all_tags.push(vendor.to_string());
    let metadata = serde_json::to_value(DescriptorMetadata::for_sample(record))
        .map_err(|err| format!("serialize metadata: {err}"))?;

    for descriptor in descriptors.iter_mut() {
        descriptor.id = record.key.drs_id();
        descriptor.tags = all_tags.clone();
        descriptor.metadata = Some(metadata.clone());
    }

    if let [single] = descriptors {
        collapse_single_object(single)?;
    }
    Ok(())
}

fn collapse_single_object(descriptor: &mut UploadDescriptor) -> Result<(), String> {
    let name = descriptor
        .name
        .as_deref()
        .ok_or_else(|| "descriptor has no name".to_string())?;
    let stem = name.split('.').next().unwrap_or_default().to_string();

    let access_url = descriptor
        .access_methods
        .first_mut()
        .and_then(|method| method.access_url.as_mut())
        .ok_or_else(|| "descriptor has no access url".to_string())?;
    access_url.url = parent_url(&access_url.url).to_string();

    descriptor.aliases = Some(vec![stem.clone()]);
    descriptor.name = Some(stem);
    Ok(())
}

/// Everything before the last `/`, keeping a bare root `/`.
fn parent_url(url: &str) -> &str {
    match url.rfind('/') {
        Some(0) => "/",
        Some(index) => &url[..index],
        None => "",
    }
}

/// Pretty JSON with four-space indentation and raw UTF-8.
pub fn to_payload_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::SampleKey;

    fn record() -> SampleRecord {
        SampleRecord {
            key: SampleKey::new("M112-00003", "MY23001"),
            patient_name: "王小明".to_string(),
            history_number: "12345678".to_string(),
            block_number: String::new(),
            tumor_purity: "40".to_string(),
            diagnosis: "Lung adenocarcinoma".to_string(),
            test_item: String::new(),
            physician: "陳醫師".to_string(),
            fiscal_year: 2023,
            receive_date: Some("2023-06-01T00:00:00+0800".to_string()),
            sign_date: None,
            report_date: Some("2023-06-20T00:00:00+0800".to_string()),
            turnaround_time: "14".to_string(),
        }
    }

    fn uploaded(name: &str, url: &str) -> UploadDescriptor {
        serde_json::from_value(json!({
            "id": "",
            "name": name,
            "mime_type": "application/pdf",
            "size": 1024,
            "checksums": [{"checksum": "abc", "type": "sha256"}],
            "access_methods": [{
                "type": "abfss",
                "access_url": {"url": url, "headers": {}},
                "region": "eastasia"
            }],
            "metadata": null
        }))
        .unwrap()
    }

    #[test]
    fn metadata_keeps_empty_properties_and_skips_missing_dates() {
        let metadata = DescriptorMetadata::for_sample(&record());
        let categories = metadata
            .extra_properties
            .iter()
            .map(|prop| prop.category.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            categories,
            vec![
                "MP_No",
                "Path_No",
                "Patient_Name",
                "Tumor_Purity",
                "Diagnosis",
                "test_item",
                "Physician",
                "Turn_Around_time"
            ]
        );
        assert_eq!(metadata.extra_properties[5].values, vec![String::new()]);
        assert_eq!(metadata.dates.len(), 2);
        assert_eq!(metadata.dates[0].kind.value, COLLECTION_DATE_LABEL);
        assert_eq!(metadata.dates[1].kind.value, REPORT_DATE_LABEL);
    }

    #[test]
    fn single_descriptor_collapses_to_folder() {
        let mut descriptors = vec![uploaded(
            "M112-00003_MY23001.pdf",
            "abfss://hub@acct.dfs.core.windows.net/Guardant360/M112-00003_MY23001/M112-00003_MY23001.pdf",
        )];
        enrich_descriptors(
            &mut descriptors,
            &record(),
            "Guardant360",
            &["NGS".to_string()],
        )
        .unwrap();

        let single = &descriptors[0];
        assert_eq!(single.id, "drs_M112-00003_MY23001");
        assert_eq!(single.tags, vec!["NGS", "Guardant360"]);
        assert_eq!(single.name.as_deref(), Some("M112-00003_MY23001"));
        assert_eq!(
            single.aliases.as_deref(),
            Some(&["M112-00003_MY23001".to_string()][..])
        );
        assert_eq!(
            single.access_methods[0].access_url.as_ref().unwrap().url,
            "abfss://hub@acct.dfs.core.windows.net/Guardant360/M112-00003_MY23001"
        );
        assert_eq!(single.other["size"], json!(1024));
        let metadata: DescriptorMetadata =
            serde_json::from_value(single.metadata.clone().unwrap()).unwrap();
        assert_eq!(metadata.extra_properties[0].values, vec!["MY23001"]);
        assert_eq!(metadata.dates.len(), 2);
        assert_eq!(single.access_methods[0].other["region"], json!("eastasia"));
    }

    #[test]
    fn several_descriptors_keep_names() {
        let mut descriptors = vec![
            uploaded("a.pdf", "abfss://hub/V/k/a.pdf"),
            uploaded("b.pdf", "abfss://hub/V/k/b.pdf"),
        ];
        enrich_descriptors(&mut descriptors, &record(), "V", &[]).unwrap();
        assert_eq!(descriptors[1].name.as_deref(), Some("b.pdf"));
        assert_eq!(
            descriptors[1].access_methods[0].access_url.as_ref().unwrap().url,
            "abfss://hub/V/k/b.pdf"
        );
        assert_eq!(descriptors[0].tags, vec!["V"]);
        assert!(descriptors.iter().all(|d| d.id == "drs_M112-00003_MY23001"));
    }

    #[test]
    fn single_descriptor_without_name_is_rejected() {
        let mut descriptor = uploaded("x.pdf", "abfss://hub/x.pdf");
        descriptor.name = None;
        let err = enrich_descriptors(&mut [descriptor], &record(), "V", &[]).unwrap_err();
        assert!(err.contains("no name"));
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(enrich_descriptors(&mut [], &record(), "V", &[]).is_err());
    }

    #[test]
    fn parent_url_edges() {
        assert_eq!(parent_url("a/b/c.pdf"), "a/b");
        assert_eq!(parent_url("/c.pdf"), "/");
        assert_eq!(parent_url("c.pdf"), "");
    }

    #[test]
    fn payload_json_is_utf8_and_four_space_indented() {
        let metadata = DescriptorMetadata::for_sample(&record());
        let bytes = to_payload_json(&metadata).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("王小明"));
        assert!(text.contains("\n    \"types\""));
    }
}
