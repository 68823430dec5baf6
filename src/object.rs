//! Map objects: points, rectangles and ellipses.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::context::AttributeContext;
use crate::geom::{Rect, Vec2};

/// Shape of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// A single position.
    Point,
    /// An axis-aligned rectangle.
    Rect,
    /// An ellipse inscribed in its bounds.
    Ellipse,
}

impl ObjectType {
    /// Lowercase name used in files.
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Point => "point",
            ObjectType::Rect => "rect",
            ObjectType::Ellipse => "ellipse",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point" => Ok(ObjectType::Point),
            "rect" => Ok(ObjectType::Rect),
            "ellipse" => Ok(ObjectType::Ellipse),
            other => Err(other.to_owned()),
        }
    }
}

/// A point, rectangle or ellipse living inside an object layer (or a tile).
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Runtime id.
    pub id: Uuid,
    /// Id written to files, minted from the map's object counter.
    pub persistent_id: i32,
    /// Shape.
    pub object_type: ObjectType,
    /// Top-left corner in pixels.
    pub position: Vec2,
    /// Ignored for points.
    pub size: Vec2,
    /// Free-form type string.
    pub tag: String,
    /// Display name.
    pub name: String,
    /// Drawn or hidden.
    pub visible: bool,
    /// Object properties and components.
    pub context: AttributeContext,
}

impl Object {
    /// A visible, unnamed object at the origin.
    pub fn new(object_type: ObjectType, persistent_id: i32) -> Self {
        Object {
            id: Uuid::new_v4(),
            persistent_id,
            object_type,
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            tag: String::new(),
            name: String::new(),
            visible: true,
            context: AttributeContext::new(),
        }
    }

    /// Hit-test box. Points have no size of their own, so they get a square half a tile
    /// wide centred on the position.
    pub fn bounds(&self, tile_size: Vec2) -> Rect {
        match self.object_type {
            ObjectType::Point => Rect::new(
                self.position.x - tile_size.x / 4.0,
                self.position.y - tile_size.y / 4.0,
                tile_size.x / 2.0,
                tile_size.y / 2.0,
            ),
            ObjectType::Rect | ObjectType::Ellipse => {
                Rect::new(self.position.x, self.position.y, self.size.x, self.size.y)
            }
        }
    }

    /// A deep copy with fresh UUIDs for the object and its context.
    pub fn clone_fresh(&self, persistent_id: i32) -> Self {
        Object {
            id: Uuid::new_v4(),
            persistent_id,
            context: self.context.clone_fresh(),
            ..self.clone()
        }
    }
}
