use image::Rgb;

use crate::analysis::{image_center, RasterImage};
use crate::models::CompassDirection;

const PIN_RADIUS: f64 = 8.0;
const CONE_LENGTH: f64 = 52.0;
const CONE_HALF_WIDTH_DEG: f64 = 25.0;

const PURPLE: Rgb<u8> = Rgb([128, 0, 128]);
const HOT_PINK: Rgb<u8> = Rgb([255, 105, 180]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

type Point = (f64, f64);

/// Copy of the capture with a center pin and a cone toward the storefront,
/// for eyeballing which way the analysis looked.
pub fn annotate(image: &RasterImage, direction: CompassDirection) -> RasterImage {
    let mut out = image.clone();
    let (cx, cy) = image_center(image);
    let center = (cx as f64, cy as f64);

    draw_cone(&mut out, center, direction);
    draw_pin(&mut out, center);
    out
}

fn draw_pin(image: &mut RasterImage, (cx, cy): Point) {
    let reach = PIN_RADIUS.ceil() as i64;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let distance = ((dx * dx + dy * dy) as f64).sqrt();
            if distance > PIN_RADIUS {
                continue;
            }
            let color = if distance > PIN_RADIUS - 1.0 { BLACK } else { PURPLE };
            put(image, cx + dx as f64, cy + dy as f64, color);
        }
    }
}

fn cone_vertex((cx, cy): Point, bearing: f64) -> Point {
    let rad = bearing.to_radians();
    (cx + CONE_LENGTH * rad.sin(), cy - CONE_LENGTH * rad.cos())
}

fn draw_cone(image: &mut RasterImage, tip: Point, direction: CompassDirection) {
    let bearing = direction.degrees() as f64;
    let left = cone_vertex(tip, bearing - CONE_HALF_WIDTH_DEG);
    let right = cone_vertex(tip, bearing + CONE_HALF_WIDTH_DEG);

    let min_x = tip.0.min(left.0).min(right.0).floor() as i64;
    let max_x = tip.0.max(left.0).max(right.0).ceil() as i64;
    let min_y = tip.1.min(left.1).min(right.1).floor() as i64;
    let max_y = tip.1.max(left.1).max(right.1).ceil() as i64;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = (x as f64, y as f64);
            if inside_triangle(p, tip, left, right) {
                put(image, p.0, p.1, HOT_PINK);
            }
        }
    }

    for (a, b) in [(tip, left), (left, right), (right, tip)] {
        draw_line(image, a, b, BLACK);
    }
}

fn edge(a: Point, b: Point, p: Point) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn inside_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let (d1, d2, d3) = (edge(a, b, p), edge(b, c, p), edge(c, a, p));
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn draw_line(image: &mut RasterImage, a: Point, b: Point, color: Rgb<u8>) {
    let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        put(image, a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t, color);
    }
}

fn put(image: &mut RasterImage, x: f64, y: f64, color: Rgb<u8>) {
    let (x, y) = (x.round(), y.round());
    if x < 0.0 || y < 0.0 || x >= image.width() as f64 || y >= image.height() as f64 {
        return;
    }
    image.put_pixel(x as u32, y as u32, color);
}
