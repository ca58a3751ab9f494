use std::fs;
use std::path::{Path, PathBuf};

use planview_core::document::{BoundaryPath, Entity};
use planview_io::{
    ConversionError, DocumentLoader, DxfFacade, ExtentsSource, IoError, LegacyConverter,
    load_drawing, summarize,
};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn sample_drawing_loads_tables_blocks_and_entities() {
    let doc = DxfFacade::new()
        .load(&fixture("sample.dxf"))
        .expect("读取 DXF 失败");

    let walls = doc.layer("walls").expect("缺少 WALLS 图层");
    assert_eq!(walls.color, Some(1));
    assert_eq!(walls.lineweight, Some(50));
    assert_eq!(walls.linetype, "DASHED");
    assert!(doc.layer("HIDDEN").unwrap().is_off);
    assert!(doc.layer("FROZEN").unwrap().is_frozen);

    let door = doc.block("door").expect("缺少 DOOR 块");
    assert_eq!(door.entities.len(), 2);
    assert!((door.base_point.x() - 1.0).abs() < 1e-9);

    assert_eq!(doc.entity_count(), 12);
    let header = doc.header_extents().and_then(|h| h.to_bounds()).unwrap();
    assert_eq!(header.to_tuple(), (-5.0, -5.0, 120.0, 80.0));

    let mut saw_polyline = false;
    let mut saw_hatch = false;
    let mut saw_mtext = false;
    for (_, entity) in doc.entities() {
        match entity {
            Entity::LwPolyline(polyline) => {
                assert!(polyline.is_closed);
                assert_eq!(polyline.vertices.len(), 4);
                assert_eq!(polyline.properties.lineweight, Some(25));
            }
            Entity::Polyline(polyline) => {
                saw_polyline = true;
                assert_eq!(polyline.vertices.len(), 3);
                assert!(!polyline.is_closed);
            }
            Entity::Hatch(hatch) => {
                saw_hatch = true;
                assert!(hatch.is_solid);
                assert_eq!(hatch.pattern_name, "SOLID");
                assert_eq!(hatch.paths.len(), 1);
                match &hatch.paths[0] {
                    BoundaryPath::Polyline { vertices, is_closed } => {
                        assert_eq!(vertices.len(), 3);
                        assert!(*is_closed);
                    }
                    other => panic!("unexpected path {other:?}"),
                }
            }
            Entity::MText(mtext) => {
                saw_mtext = true;
                assert_eq!(mtext.plain_text().unwrap(), "Room\nKitchen");
                assert_eq!(mtext.char_height, Some(2.0));
            }
            Entity::Insert(insert) => {
                assert_eq!(insert.block_name, "DOOR");
                assert_eq!(insert.properties.color, Some(5));
            }
            _ => {}
        }
    }
    assert!(saw_polyline && saw_hatch && saw_mtext);
}

#[test]
fn circle_without_radius_is_skipped_and_counted() {
    let text = "  0\nSECTION\n  2\nENTITIES\n\
  0\nLINE\n  8\n0\n 10\n0\n 20\n0\n 11\n10\n 21\n5\n\
  0\nCIRCLE\n  8\n0\n 10\n3\n 20\n3\n\
  0\nENDSEC\n  0\nEOF\n";
    let doc = DxfFacade::new().parse_str(text).expect("单个无效实体不应使读取失败");
    assert_eq!(doc.entity_count(), 1);
    assert_eq!(doc.skipped_entities(), 1);
    let (_, entity) = doc.entities().next().unwrap();
    assert!(matches!(entity, Entity::Line(_)));

    let summary = summarize(&doc);
    assert_eq!(summary.total_entities, 1);
    assert_eq!(summary.skipped_entities, 1);
}

#[test]
fn summary_reports_layers_types_and_header_extents() {
    let doc = DxfFacade::new().load(&fixture("sample.dxf")).unwrap();
    let summary = summarize(&doc);

    assert_eq!(summary.total_entities, 12);
    assert_eq!(summary.entity_types.get("LINE"), Some(&3));
    assert_eq!(summary.entity_types.get("DIMENSION"), Some(&1));
    assert_eq!(summary.extents_source, Some(ExtentsSource::Header));
    let walls = summary.layers.iter().find(|l| l.name == "WALLS").unwrap();
    assert_eq!(walls.entity_count, 2);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["total_entities"], 12);
    assert_eq!(json["extents_source"], "header");
    assert!(json["layers"].as_array().unwrap().len() >= 4);
}

#[test]
fn load_drawing_accepts_dxf_without_conversion() {
    let drawing = load_drawing(&fixture("sample.dxf"), None).unwrap();
    assert!(!drawing.was_converted());
    assert_eq!(drawing.document.entity_count(), 12);
}

#[test]
fn unsupported_extension_is_rejected() {
    let err = load_drawing(Path::new("plan.pdf"), None).unwrap_err();
    assert!(matches!(err, IoError::UnsupportedFormat(_)));
}

#[test]
fn text_file_with_dxf_extension_is_not_dxf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.dxf");
    fs::write(&path, "hello\nworld\n").unwrap();
    let err = load_drawing(&path, None).unwrap_err();
    assert!(matches!(err, IoError::NotDxf(_)));
}

#[test]
fn binary_dwg_without_converter_reports_conversion_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.dwg");
    fs::write(&path, b"AC1027\x00\x01\x02binary").unwrap();
    let err = load_drawing(&path, None).unwrap_err();
    assert!(matches!(err, IoError::Conversion { .. }));
}

struct CopyFixture {
    output: PathBuf,
}

impl LegacyConverter for CopyFixture {
    fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        if !input.is_file() {
            return Err(ConversionError::SourceMissing(input.to_path_buf()));
        }
        fs::copy(fixture("sample.dxf"), &self.output).map_err(ConversionError::Workspace)?;
        Ok(self.output.clone())
    }
}

struct AlwaysFails;

impl LegacyConverter for AlwaysFails {
    fn convert(&self, _input: &Path) -> Result<PathBuf, ConversionError> {
        Err(ConversionError::Failed {
            detail: "退出码 1".to_string(),
        })
    }
}

#[test]
fn dwg_is_parsed_through_converter_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.DWG");
    fs::write(&path, b"AC1027\x00binary").unwrap();
    let converter = CopyFixture {
        output: dir.path().join("plan.dxf"),
    };

    let drawing = load_drawing(&path, Some(&converter)).unwrap();
    assert!(drawing.was_converted());
    assert_eq!(drawing.converted_path.as_deref(), Some(converter.output.as_path()));
    assert_eq!(drawing.document.entity_count(), 12);
}

#[test]
fn converter_failure_is_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.dwg");
    fs::write(&path, b"AC1027\x00binary").unwrap();

    let err = load_drawing(&path, Some(&AlwaysFails)).unwrap_err();
    match err {
        IoError::Conversion { detail } => assert!(detail.contains("退出码 1")),
        other => panic!("unexpected error {other:?}"),
    }
}
