//! Built-in engine: draws the features of a [`Style`] with tiny-skia.

use crate::{
    engine::{EngineError, ProjectedBox, Projection, RenderContext, RenderEngine, projection_for},
    projection::{GeoPoint, TILE_SIZE},
    style::{Geometry, Layer, Rgba, Style},
};
use image::RgbaImage;
use std::sync::Arc;
use tiny_skia::{Color, FillRule, Paint, Path, PathBuilder, Pixmap, Stroke, Transform};

#[derive(Clone, Debug)]
enum Shape {
    Point((f64, f64)),
    Line(Vec<(f64, f64)>),
    /// Rings of one polygon, exterior first.
    Area(Vec<Vec<(f64, f64)>>),
}

#[derive(Clone, Debug)]
struct Feature {
    shape: Shape,
    bounds: ProjectedBox,
}

#[derive(Clone, Debug)]
struct ProjectedLayer {
    fill: Option<Rgba>,
    stroke: Option<Rgba>,
    stroke_width: f32,
    point_radius: f32,
    features: Vec<Feature>,
}

fn project_ring(
    projection: &dyn Projection,
    ring: &[[f64; 2]],
) -> Result<Vec<(f64, f64)>, EngineError> {
    ring.iter()
        .map(|&[lon, lat]| projection.forward(GeoPoint::new(lon, lat)))
        .collect()
}

fn feature(shape: Shape) -> Option<Feature> {
    let bounds = match &shape {
        Shape::Point(point) => ProjectedBox::from_corners(*point, *point),
        Shape::Line(line) => ProjectedBox::enclosing(line.iter().copied())?,
        Shape::Area(rings) => ProjectedBox::enclosing(rings.iter().flatten().copied())?,
    };

    Some(Feature { shape, bounds })
}

fn project_geometry(
    projection: &dyn Projection,
    geometry: &Geometry,
) -> Result<Vec<Feature>, EngineError> {
    let shapes = match geometry {
        Geometry::Point([lon, lat]) => {
            vec![Shape::Point(projection.forward(GeoPoint::new(*lon, *lat))?)]
        }
        Geometry::LineString(line) => vec![Shape::Line(project_ring(projection, line)?)],
        Geometry::MultiLineString(lines) => lines
            .iter()
            .map(|line| project_ring(projection, line).map(Shape::Line))
            .collect::<Result<_, _>>()?,
        Geometry::Polygon(rings) => vec![Shape::Area(
            rings
                .iter()
                .map(|ring| project_ring(projection, ring))
                .collect::<Result<_, _>>()?,
        )],
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| {
                rings
                    .iter()
                    .map(|ring| project_ring(projection, ring))
                    .collect::<Result<_, _>>()
                    .map(Shape::Area)
            })
            .collect::<Result<_, _>>()?,
    };

    Ok(shapes.into_iter().filter_map(feature).collect())
}

fn project_layer(projection: &dyn Projection, layer: &Layer) -> Result<ProjectedLayer, EngineError> {
    let mut features = Vec::new();

    for geometry in &layer.features {
        features.extend(project_geometry(projection, geometry)?);
    }

    Ok(ProjectedLayer {
        fill: layer.fill,
        stroke: layer.stroke,
        stroke_width: layer.stroke_width,
        point_radius: layer.point_radius,
        features,
    })
}

/// Holds the style with its geometry already projected into the style's SRS.
#[derive(Clone, Debug)]
pub struct VectorEngine {
    srs: String,
    background: Option<Rgba>,
    buffer_size: u32,
    layers: Arc<Vec<ProjectedLayer>>,
}

impl VectorEngine {
    pub fn new(style: &Style) -> Result<Self, EngineError> {
        let projection = projection_for(&style.srs)?;

        let layers = style
            .layers
            .iter()
            .map(|layer| project_layer(projection.as_ref(), layer))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            srs: style.srs.clone(),
            background: style.background,
            buffer_size: style.buffer_size,
            layers: Arc::new(layers),
        })
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.features.len()).sum()
    }
}

impl RenderEngine for VectorEngine {
    type Context = VectorMap;

    fn create_context(&self) -> Result<VectorMap, EngineError> {
        Ok(VectorMap {
            projection: projection_for(&self.srs)?,
            background: self.background,
            layers: Arc::clone(&self.layers),
            width: TILE_SIZE,
            height: TILE_SIZE,
            extent: None,
            buffer_size: self.buffer_size,
        })
    }
}

/// Per-worker map object of [`VectorEngine`].
pub struct VectorMap {
    projection: Box<dyn Projection>,
    background: Option<Rgba>,
    layers: Arc<Vec<ProjectedLayer>>,
    width: u32,
    height: u32,
    extent: Option<ProjectedBox>,
    buffer_size: u32,
}

fn color([r, g, b, a]: [u8; 4]) -> Color {
    Color::from_rgba8(r, g, b, a)
}

fn paint(rgba: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();

    paint.set_color(color(rgba.0));

    paint.anti_alias = true;

    paint
}

struct Viewport {
    extent: ProjectedBox,
    scale_x: f64,
    scale_y: f64,
}

impl Viewport {
    fn to_px(&self, (x, y): (f64, f64)) -> (f32, f32) {
        (
            ((x - self.extent.min_x) * self.scale_x) as f32,
            ((self.extent.max_y - y) * self.scale_y) as f32,
        )
    }

    fn polyline(&self, points: &[(f64, f64)], builder: &mut PathBuilder, close: bool) {
        let mut points = points.iter().map(|point| self.to_px(*point));

        let Some((x, y)) = points.next() else {
            return;
        };

        builder.move_to(x, y);

        for (x, y) in points {
            builder.line_to(x, y);
        }

        if close {
            builder.close();
        }
    }

    fn path(&self, shape: &Shape, point_radius: f32) -> Option<Path> {
        match shape {
            Shape::Point(point) => {
                let (x, y) = self.to_px(*point);

                PathBuilder::from_circle(x, y, point_radius)
            }
            Shape::Line(line) => {
                let mut builder = PathBuilder::new();

                self.polyline(line, &mut builder, false);

                builder.finish()
            }
            Shape::Area(rings) => {
                let mut builder = PathBuilder::new();

                for ring in rings {
                    self.polyline(ring, &mut builder, true);
                }

                builder.finish()
            }
        }
    }
}

impl RenderContext for VectorMap {
    fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError> {
        self.projection.forward(point)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn zoom_to_box(&mut self, extent: ProjectedBox) {
        self.extent = Some(extent);
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    fn set_buffer_size(&mut self, buffer_size: u32) {
        self.buffer_size = buffer_size;
    }

    fn render(&mut self) -> Result<RgbaImage, EngineError> {
        let extent = self.extent.ok_or(EngineError::NoExtent)?;

        if extent.is_degenerate() {
            return Err(EngineError::DegenerateExtent(extent));
        }

        let (width, height) = (self.width, self.height);

        let mut pixmap =
            Pixmap::new(width, height).ok_or(EngineError::Allocation { width, height })?;

        if let Some(background) = self.background {
            pixmap.fill(color(background.0));
        }

        let viewport = Viewport {
            extent,
            scale_x: width as f64 / extent.width(),
            scale_y: height as f64 / extent.height(),
        };

        let buffer = self.buffer_size as f64;

        let cull = extent.buffered(buffer / viewport.scale_x, buffer / viewport.scale_y);

        for layer in self.layers.iter() {
            let fill = layer.fill.map(paint);

            let stroke = layer.stroke.map(|rgba| {
                (
                    paint(rgba),
                    Stroke {
                        width: layer.stroke_width,
                        ..Stroke::default()
                    },
                )
            });

            for feature in &layer.features {
                if !feature.bounds.intersects(&cull) {
                    continue;
                }

                let Some(path) = viewport.path(&feature.shape, layer.point_radius) else {
                    continue;
                };

                let closed = !matches!(feature.shape, Shape::Line(_));

                if let (Some(fill), true) = (&fill, closed) {
                    pixmap.fill_path(&path, fill, FillRule::EvenOdd, Transform::identity(), None);
                }

                if let Some((paint, stroke)) = &stroke {
                    pixmap.stroke_path(&path, paint, stroke, Transform::identity(), None);
                }
            }
        }

        let data = pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let pixel = pixel.demultiply();

                [pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()]
            })
            .collect();

        RgbaImage::from_raw(width, height, data).ok_or(EngineError::Allocation { width, height })
    }
}
