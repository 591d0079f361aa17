use detkit_vision::{bbox_overlaps, BBox, OverlapMode};
use proptest::prelude::*;

fn arb_box() -> impl Strategy<Value = BBox> {
    (0u16..200, 0u16..200, 0u16..60, 0u16..60).prop_map(|(x, y, w, h)| {
        let (x, y) = (f32::from(x), f32::from(y));
        BBox::new(x, y, x + f32::from(w), y + f32::from(h))
    })
}

proptest! {
    #[test]
    fn iou_is_symmetric(
        a in prop::collection::vec(arb_box(), 0..8),
        b in prop::collection::vec(arb_box(), 0..8),
    ) {
        let ab = bbox_overlaps(&a, &b, OverlapMode::Iou, false).unwrap();
        let ba = bbox_overlaps(&b, &a, OverlapMode::Iou, false).unwrap();
        prop_assert_eq!(ab.dim(), (a.len(), b.len()));
        prop_assert_eq!(ab.t(), ba.view());
    }

    #[test]
    fn scores_are_bounded(
        a in prop::collection::vec(arb_box(), 1..8),
        b in prop::collection::vec(arb_box(), 1..8),
    ) {
        for mode in [OverlapMode::Iou, OverlapMode::Iof] {
            let m = bbox_overlaps(&a, &b, mode, false).unwrap();
            for &v in m.iter() {
                prop_assert!(v >= 0.0 && v <= 1.0 + 1e-6, "{:?} gave {}", mode, v);
            }
        }
    }

    #[test]
    fn self_overlap_is_total(a in prop::collection::vec(arb_box(), 1..8)) {
        let m = bbox_overlaps(&a, &a, OverlapMode::Iou, true).unwrap();
        prop_assert!(m.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn iof_never_below_iou(
        a in prop::collection::vec(arb_box(), 1..6),
        b in prop::collection::vec(arb_box(), 1..6),
    ) {
        let iou = bbox_overlaps(&a, &b, OverlapMode::Iou, false).unwrap();
        let iof = bbox_overlaps(&a, &b, OverlapMode::Iof, false).unwrap();
        for (u, f) in iou.iter().zip(iof.iter()) {
            prop_assert!(f + 1e-6 >= *u);
        }
    }
}
