//! Tests for PDF rotation operations

#[cfg(test)]
mod tests {
    use crate::document::{self, load, page_rotation};
    use crate::error::ToolboxError;
    use crate::operations::rotate::*;
    use crate::operations::{PageRange, PageSelection};
    use crate::test_support::{sample_doc, write_sample};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn rotations(doc: &lopdf::Document) -> Vec<i64> {
        document::page_ids(doc)
            .into_iter()
            .map(|id| page_rotation(doc, id))
            .collect()
    }

    #[test]
    fn test_rotate_all_pages() {
        let dir = TempDir::new().unwrap();
        let input = write_sample(dir.path(), "in.pdf", 3);
        let output = dir.path().join("in_rotated.pdf");

        let rotated = rotate_pdf_pages(&input, &output, &RotateOptions::default()).unwrap();
        assert_eq!(rotated, 3);
        assert_eq!(rotations(&load(&output, None).unwrap()), vec![90, 90, 90]);
    }

    #[test]
    fn test_rotate_odd_and_even() {
        let mut doc = sample_doc(4, "odd");
        rotate_document(&mut doc, RotationAngle::Rotate180, &PageSelection::Odd).unwrap();
        assert_eq!(rotations(&doc), vec![180, 0, 180, 0]);

        rotate_document(&mut doc, RotationAngle::Clockwise90, &PageSelection::Even).unwrap();
        assert_eq!(rotations(&doc), vec![180, 90, 180, 90]);
    }

    #[test]
    fn test_rotation_adds_to_existing() {
        let mut doc = sample_doc(2, "existing");
        let first = document::page_ids(&doc)[0];
        doc.get_dictionary_mut(first).unwrap().set("Rotate", 270i64);

        rotate_document(&mut doc, RotationAngle::Rotate180, &PageSelection::All).unwrap();
        assert_eq!(rotations(&doc), vec![90, 180]);
    }

    #[test]
    fn test_custom_range_is_clamped() {
        let mut doc = sample_doc(3, "clamp");
        let selection = PageSelection::Range(PageRange::parse("2-10").unwrap());
        let rotated = rotate_document(&mut doc, RotationAngle::Clockwise270, &selection).unwrap();
        assert_eq!(rotated, 2);
        assert_eq!(rotations(&doc), vec![0, 270, 270]);
    }

    #[test]
    fn test_rotate_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = rotate_pdf_pages(
            dir.path().join("nope.pdf"),
            dir.path().join("out.pdf"),
            &RotateOptions::default(),
        );
        assert!(matches!(result, Err(ToolboxError::FileNotFound(_))));
        assert!(!dir.path().join("out.pdf").exists());
    }
}
