#![no_main]
use libfuzzer_sys::fuzz_target;
use zenstage::*;

fuzz_target!(|data: &[u8]| {
    // Arbitrary geometry and anchors must never panic; valid windows must
    // produce exactly window-sized outputs.
    let [h, w, wh, ww, ax, ay, gray, ty, rest @ ..] = data else {
        return;
    };
    let (h, w) = (*h as usize % 24 + 1, *w as usize % 24 + 1);
    let channels = if gray & 1 == 0 { 3 } else { 1 };
    let mut pixels = rest.to_vec();
    pixels.resize(h * w * channels, 0);
    let Ok(image) = Image::interleaved_u8(h, w, channels, pixels) else {
        return;
    };
    let output_dtype = [
        ElementType::U8,
        ElementType::I16,
        ElementType::F16,
        ElementType::F32,
    ][*ty as usize % 4];
    let Ok(crop) = Crop::new(
        OpSpec::new()
            .with_arg("crop", Argument::Ints(vec![*wh as i64 % 26, *ww as i64 % 26]))
            .with_arg("crop_pos_x", Argument::Float(*ax as f32 / 250.0))
            .with_arg("crop_pos_y", Argument::Float(*ay as f32 / 250.0))
            .with_arg("output_dtype", Argument::ElementType(Some(output_dtype)))
            .with_arg(
                "image_type",
                Argument::ImageType(if channels == 3 { ImageType::Rgb } else { ImageType::Gray }),
            ),
    ) else {
        return;
    };
    let (win_h, win_w) = crop.window();
    let inputs = [Batch::new(vec![image])];
    if let Ok(out) = StageRunner::new(crop).run(&inputs, &enough::Unstoppable) {
        assert_eq!(out[0].images[0].shape(), Shape::new(win_h, win_w, channels));
    }
});
