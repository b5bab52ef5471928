#![no_main]
use libfuzzer_sys::fuzz_target;
use zenstage::*;

fuzz_target!(|data: &[u8]| {
    // Inside the placement the canvas holds the source, outside it the fill.
    let [h, w, ratio, px, py, fill, rest @ ..] = data else {
        return;
    };
    let (h, w) = (*h as usize % 16 + 1, *w as usize % 16 + 1);
    let mut pixels = rest.to_vec();
    pixels.resize(h * w, 0);
    let Ok(image) = Image::interleaved_u8(h, w, 1, pixels) else {
        return;
    };
    let Ok(paste) = Paste::new(
        OpSpec::new()
            .with_arg("n_channels", Argument::Int(1))
            .with_arg("ratio", Argument::Float(*ratio as f32 / 50.0))
            .with_arg("paste_x", Argument::Float(*px as f32 / 250.0))
            .with_arg("paste_y", Argument::Float(*py as f32 / 250.0))
            .with_arg("fill_value", Argument::Float(*fill as f32)),
    ) else {
        return;
    };
    let inputs = [Batch::new(vec![image])];
    let Ok(out) = StageRunner::new(paste).run(&inputs, &enough::Unstoppable) else {
        return;
    };
    let canvas = &out[0].images[0];
    let k = canvas.shape();
    let Ok(p) = geometry::resolve_paste(
        h,
        w,
        *ratio as f32 / 50.0,
        *py as f32 / 250.0,
        *px as f32 / 250.0,
    ) else {
        panic!("operator accepted a placement the resolver rejects");
    };
    assert_eq!((k.height, k.width), (p.canvas_height, p.canvas_width));
    for y in 0..k.height {
        for x in 0..k.width {
            let inside = (p.origin_y..p.origin_y + h).contains(&y)
                && (p.origin_x..p.origin_x + w).contains(&x);
            let expected = if inside {
                inputs[0].images[0].value(y - p.origin_y, x - p.origin_x, 0)
            } else {
                *fill as f64
            };
            assert_eq!(canvas.value(y, x, 0), expected);
        }
    }
});
