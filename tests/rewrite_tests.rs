//! Rewrite driver and censoring pipeline integration tests

use std::cell::RefCell;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdfveil::config::{CensorConfig, CensorRule};
use pdfveil::pipeline::process_document;
use pdfveil::{CharEvent, DecisionSource, RewriteDriver, SharedDocument};

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn text(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

/// Concatenation of per-operation encodings, the exact byte form the driver
/// writes region content in.
fn encode(operations: &[Operation]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for operation in operations {
        let content = Content {
            operations: vec![operation.clone()],
        };
        bytes.extend(content.encode().unwrap());
    }
    bytes
}

/// Single-page document in the usual catalog/pages/page shape, resources on
/// the pages node.
fn build_doc(operations: Vec<Operation>) -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, page_id)
}

struct CensorAll;

impl DecisionSource for CensorAll {
    fn should_censor(&mut self, _event: &CharEvent) -> bool {
        true
    }
}

struct KeepAll {
    seen: Vec<CharEvent>,
}

impl DecisionSource for KeepAll {
    fn should_censor(&mut self, event: &CharEvent) -> bool {
        self.seen.push(*event);
        false
    }
}

fn rewrite(doc: Document, decisions: &mut dyn DecisionSource) -> Document {
    let shared: SharedDocument = Rc::new(RefCell::new(doc));
    {
        let mut driver = RewriteDriver::new(shared.clone(), decisions);
        driver.process().unwrap();
    }
    match Rc::try_unwrap(shared) {
        Ok(cell) => cell.into_inner(),
        Err(_) => panic!("document still shared"),
    }
}

#[test]
fn test_censored_text_suppresses_the_paired_follower() {
    let operations = vec![
        op("q", vec![]),
        op("BT", vec![]),
        op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
        op("Td", vec![Object::Integer(100), Object::Integer(700)]),
        op("Tj", vec![text("secret")]),
        op("Td", vec![Object::Integer(0), Object::Integer(-20)]),
        op("ET", vec![]),
        op("Q", vec![]),
    ];
    let (doc, page_id) = build_doc(operations);
    let doc = rewrite(doc, &mut CensorAll);

    let expected = encode(&[
        op("q", vec![]),
        op("BT", vec![]),
        op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
        op("Td", vec![Object::Integer(100), Object::Integer(700)]),
        op("ET", vec![]),
        op("Q", vec![]),
    ]);
    assert_eq!(doc.get_page_content(page_id).unwrap(), expected);
}

#[test]
fn test_kept_text_does_not_suppress_the_follower() {
    let operations = vec![
        op("BT", vec![]),
        op("Tj", vec![text("ab")]),
        op("Td", vec![Object::Integer(0), Object::Integer(-20)]),
        op("ET", vec![]),
    ];
    let (doc, page_id) = build_doc(operations);
    let mut decisions = KeepAll { seen: Vec::new() };
    let doc = rewrite(doc, &mut decisions);

    // text-showing operations are withheld either way; the follower survives
    let expected = encode(&[
        op("BT", vec![]),
        op("Td", vec![Object::Integer(0), Object::Integer(-20)]),
        op("ET", vec![]),
    ]);
    assert_eq!(doc.get_page_content(page_id).unwrap(), expected);
    let chars: String = decisions.seen.iter().map(|e| e.ch).collect();
    assert_eq!(chars, "ab");
    let offsets: Vec<usize> = decisions.seen.iter().map(|e| e.offset).collect();
    assert_eq!(offsets, vec![0, 1]);
}

#[test]
fn test_form_xobject_is_rewritten_in_place() {
    let (mut doc, page_id) = build_doc(vec![
        op("q", vec![]),
        op("Do", vec![Object::Name(b"Fm1".to_vec())]),
        op("Q", vec![]),
    ]);
    let form_ops = vec![
        op("BT", vec![]),
        op("Td", vec![Object::Integer(10), Object::Integer(10)]),
        op("Tj", vec![text("hidden")]),
        op("ET", vec![]),
        op("re", vec![0.into(), 0.into(), 5.into(), 5.into()]),
        op("f", vec![]),
    ];
    let form_content = Content {
        operations: form_ops,
    };
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        },
        form_content.encode().unwrap(),
    ));
    // give the page its own resources carrying the XObject
    let resources = dictionary! {
        "XObject" => dictionary! { "Fm1" => form_id },
    };
    doc.get_object_mut(page_id)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("Resources", Object::Dictionary(resources));

    let doc = rewrite(doc, &mut CensorAll);

    // the invoking operation is written before the recursion
    let expected_page = encode(&[
        op("q", vec![]),
        op("Do", vec![Object::Name(b"Fm1".to_vec())]),
        op("Q", vec![]),
    ]);
    assert_eq!(doc.get_page_content(page_id).unwrap(), expected_page);

    // inside the form: Tj withheld, its paired ET suppressed, graphics kept
    let expected_form = encode(&[
        op("BT", vec![]),
        op("Td", vec![Object::Integer(10), Object::Integer(10)]),
        op("re", vec![0.into(), 0.into(), 5.into(), 5.into()]),
        op("f", vec![]),
    ]);
    let form = doc.get_object(form_id).unwrap().as_stream().unwrap();
    assert_eq!(form.content, expected_form);
}

#[test]
fn test_pattern_censor_end_to_end() {
    let operations = vec![
        op("BT", vec![]),
        op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
        op("Td", vec![Object::Integer(72), Object::Integer(720)]),
        op("Tj", vec![text("hello")]),
        op("Tj", vec![text("world")]),
        op("ET", vec![]),
    ];
    let (doc, page_id) = build_doc(operations);
    let config = CensorConfig {
        rules: vec![CensorRule {
            name: "world".into(),
            pattern: "world".into(),
        }],
        draw_boxes: true,
    };
    let (doc, stats) = process_document(doc, &config).unwrap();

    let content = doc.get_page_content(page_id).unwrap();
    let rendered = String::from_utf8_lossy(&content);
    assert!(!rendered.contains("Tj"));
    assert!(rendered.contains("re"));
    assert!(rendered.contains("rg"));
    assert!(rendered.contains('f'));

    assert_eq!(stats.pages, 1);
    assert_eq!(stats.tokens_matched, 1);
    assert_eq!(stats.chars_censored, 5);
    assert_eq!(stats.boxes_drawn, 1);
}

#[test]
fn test_boxes_can_be_disabled() {
    let operations = vec![
        op("BT", vec![]),
        op("Tj", vec![text("world")]),
        op("ET", vec![]),
    ];
    let (doc, page_id) = build_doc(operations);
    let config = CensorConfig {
        rules: vec![CensorRule {
            name: "world".into(),
            pattern: "world".into(),
        }],
        draw_boxes: false,
    };
    let (doc, stats) = process_document(doc, &config).unwrap();
    let content = doc.get_page_content(page_id).unwrap();
    let rendered = String::from_utf8_lossy(&content);
    assert!(!rendered.contains("re"));
    assert_eq!(stats.boxes_drawn, 0);
    assert_eq!(stats.tokens_matched, 1);
}

#[test]
fn test_shared_form_keeps_decisions_aligned_across_pages() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let form_content = Content {
        operations: vec![
            op("BT", vec![]),
            op("Tj", vec![text("xx")]),
            op("ET", vec![]),
        ],
    };
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        },
        form_content.encode().unwrap(),
    ));
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Fm1" => form_id },
    });
    let page_ops = vec![
        op("q", vec![]),
        op("Do", vec![Object::Name(b"Fm1".to_vec())]),
        op("Q", vec![]),
        op("BT", vec![]),
        op("Td", vec![Object::Integer(72), Object::Integer(720)]),
        op("Tj", vec![text("world")]),
        op("ET", vec![]),
    ];
    let mut kids = Vec::new();
    let mut page_ids = Vec::new();
    for _ in 0..2 {
        let content = Content {
            operations: page_ops.clone(),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
        page_ids.push(page_id);
    }
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => 2,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let config = CensorConfig {
        rules: vec![CensorRule {
            name: "world".into(),
            pattern: "world".into(),
        }],
        draw_boxes: false,
    };
    let (doc, stats) = process_document(doc, &config).unwrap();

    // "world" is censored on both pages, so the ET paired with it must be
    // suppressed on both; if the revisited form shifted the second page's
    // character numbering, its ET would survive
    let expected = encode(&[
        op("q", vec![]),
        op("Do", vec![Object::Name(b"Fm1".to_vec())]),
        op("Q", vec![]),
        op("BT", vec![]),
        op("Td", vec![Object::Integer(72), Object::Integer(720)]),
    ]);
    for page_id in page_ids {
        assert_eq!(doc.get_page_content(page_id).unwrap(), expected);
    }
    assert_eq!(stats.tokens_matched, 2);
    assert_eq!(stats.chars_censored, 10);

    // the shared form itself was rewritten once, with its text removed
    let form = doc.get_object(form_id).unwrap().as_stream().unwrap();
    let form_text = String::from_utf8_lossy(&form.content).to_string();
    assert!(!form_text.contains("Tj"));
}

#[test]
fn test_batch_continues_past_a_broken_document() {
    use pdfveil::pipeline::{Pipeline, RedactionJob};

    let dir = std::env::temp_dir().join(format!("pdfveil-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let good_in = dir.join("good.pdf");
    let (mut doc, _) = build_doc(vec![
        op("BT", vec![]),
        op("Tj", vec![text("world")]),
        op("ET", vec![]),
    ]);
    doc.save(&good_in).unwrap();

    let bad_in = dir.join("bad.pdf");
    std::fs::write(&bad_in, b"not a pdf at all").unwrap();

    let config = CensorConfig {
        rules: vec![CensorRule {
            name: "world".into(),
            pattern: "world".into(),
        }],
        draw_boxes: true,
    };
    let pipeline = Pipeline::new(config, false);
    let jobs = vec![
        RedactionJob {
            input: bad_in.clone(),
            output: dir.join("bad.out.pdf"),
        },
        RedactionJob {
            input: good_in.clone(),
            output: dir.join("good.out.pdf"),
        },
    ];
    let summary = tokio_test::block_on(pipeline.execute(jobs));
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert!(dir.join("good.out.pdf").exists());
    assert!(!dir.join("bad.out.pdf").exists());

    std::fs::remove_dir_all(&dir).ok();
}
