use proptest::prelude::*;
use seg_node::bridge::{self, BgrImage, Header, Image};
use seg_node::segmentation::{blend_in_place, LabelMap, LabelTable};

fn image_strategy() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
    (1u32..16, 1u32..16).prop_flat_map(|(w, h)| {
        (
            Just(w),
            Just(h),
            prop::collection::vec(any::<u8>(), (w * h * 3) as usize),
        )
    })
}

proptest! {
    #[test]
    fn bgr8_decode_encode_is_lossless((width, height, data) in image_strategy()) {
        let msg = Image {
            header: Header::default(),
            height,
            width,
            encoding: "bgr8".to_string(),
            is_bigendian: 0,
            step: width * 3,
            data,
        };

        let decoded = bridge::imgmsg_to_bgr(&msg).unwrap();
        let encoded = bridge::bgr_to_imgmsg(&decoded, msg.header.clone()).unwrap();
        prop_assert_eq!(encoded, msg);
    }

    #[test]
    fn half_blend_is_the_rounded_mean(
        (width, height, base) in image_strategy(),
        seed in any::<u8>(),
    ) {
        let overlay: Vec<u8> = base.iter().map(|v| v.wrapping_mul(31).wrapping_add(seed)).collect();
        let mut out = BgrImage::from_raw(width, height, base.clone()).unwrap();
        let mask = BgrImage::from_raw(width, height, overlay.clone()).unwrap();

        blend_in_place(&mut out, &mask, 0.5);

        for ((&o, &m), &b) in out.as_raw().iter().zip(&overlay).zip(&base) {
            let sum = m as u16 + b as u16;
            let floor = sum / 2;
            // halfway cases round to even
            let expected = if sum % 2 == 1 && floor % 2 == 1 { floor + 1 } else { floor };
            prop_assert_eq!(o as u16, expected);
        }
    }

    #[test]
    fn colorize_is_a_table_lookup(
        classes in prop::collection::vec(0usize..4, 1..64),
    ) {
        let table = LabelTable::new(vec![[1, 2, 3], [40, 50, 60], [7, 8, 9], [255, 0, 128]]);
        let width = classes.len() as u32;
        let map = LabelMap::new(width, 1, classes.clone()).unwrap();

        let mask = table.colorize(&map).unwrap();
        for (x, &class) in classes.iter().enumerate() {
            prop_assert_eq!(Some(*mask.get_pixel(x as u32, 0)), table.color(class));
        }
    }
}
