//! Game-specific components

use ecs_engine::prelude::*;
use nalgebra::Vector2;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Asteroid size categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsteroidSize {
    /// Large asteroid (splits into medium)
    Large,

    /// Medium asteroid (splits into small)
    Medium,

    /// Small asteroid (destroyed completely)
    Small,
}

impl AsteroidSize {
    /// Get the scale factor for this size
    pub fn scale_factor(self) -> f64 {
        match self {
            AsteroidSize::Large => 2.0,
            AsteroidSize::Medium => 1.5,
            AsteroidSize::Small => 1.0,
        }
    }

    /// Get the points awarded for destroying this size
    pub fn points(self) -> u32 {
        match self {
            AsteroidSize::Large => 20,
            AsteroidSize::Medium => 50,
            AsteroidSize::Small => 100,
        }
    }

    /// Get the next smaller size when split
    pub fn split_into(self) -> Option<AsteroidSize> {
        match self {
            AsteroidSize::Large => Some(AsteroidSize::Medium),
            AsteroidSize::Medium => Some(AsteroidSize::Small),
            AsteroidSize::Small => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            AsteroidSize::Large => "large",
            AsteroidSize::Medium => "medium",
            AsteroidSize::Small => "small",
        }
    }
}

/// Rigid body state, decorated onto the `body` component
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Position in field units
    pub position: Vector2<f64>,
    /// Velocity in field units per second
    pub velocity: Vector2<f64>,
    /// Collision radius
    pub radius: f64,
}

impl Body {
    /// Create a body at rest
    pub fn at(x: f64, y: f64, radius: f64) -> Self {
        Self {
            position: Vector2::new(x, y),
            velocity: Vector2::zeros(),
            radius,
        }
    }

    /// Integrate the position over `seconds`
    pub fn advance(&mut self, seconds: f64) {
        let velocity = self.velocity;
        self.position += velocity * seconds;
    }

    /// Wrap the position into a `width` by `height` field
    ///
    /// An axis without a positive size is left alone.
    pub fn wrap(&mut self, width: f64, height: f64) {
        if width > 0.0 {
            self.position.x = self.position.x.rem_euclid(width);
        }
        if height > 0.0 {
            self.position.y = self.position.y.rem_euclid(height);
        }
    }
}

impl Record for Body {
    fn keys(&self) -> Vec<String> {
        ["x", "y", "dx", "dy", "radius", "speed"].map(String::from).to_vec()
    }

    fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            "x" => self.position.x,
            "y" => self.position.y,
            "dx" => self.velocity.x,
            "dy" => self.velocity.y,
            "radius" => self.radius,
            "speed" => self.velocity.norm(),
            _ => return None,
        };
        Some(json!(value))
    }

    fn set(&mut self, key: &str, value: Value) -> bool {
        let Some(value) = value.as_f64() else {
            return false;
        };
        match key {
            "x" => self.position.x = value,
            "y" => self.position.y = value,
            "dx" => self.velocity.x = value,
            "dy" => self.velocity.y = value,
            "radius" => self.radius = value,
            _ => return false,
        }
        true
    }
}

/// Asteroid as listed in a level file or rolled by the spawner
#[derive(Debug, Clone, Deserialize)]
pub struct AsteroidSpec {
    /// Horizontal position
    pub x: f64,
    /// Vertical position
    pub y: f64,
    /// Size category
    pub size: AsteroidSize,
    /// Initial velocity, zero if not given
    #[serde(default)]
    pub velocity: [f64; 2],
}

/// Base radius of a small asteroid
pub const BASE_RADIUS: f64 = 12.0;

/// Data component factory
///
/// Every component gets a `tag` naming what built it; missing objects become
/// empty components.
pub fn component_factory() -> Factory<Value, Component> {
    let mut factory: Factory<Value, Component> = Factory::new();
    factory.set("asteroid", |mut data: Value| {
        if let Some(object) = data.as_object_mut() {
            object.insert("tag".to_string(), json!("asteroid"));
        }
        Component::from_value(data).unwrap_or_default()
    });
    factory
}

/// Entity factory for everything the field contains
///
/// `asteroid` and `rock` build an entity with a decorated `body` component
/// and an `asteroid` data component.
pub fn entity_factory() -> Factory<AsteroidSpec, Entity> {
    let components = component_factory();
    let mut factory: Factory<AsteroidSpec, Entity> = Factory::new();
    factory.use_middleware(|mut spec: AsteroidSpec| {
        if !(spec.velocity[0].is_finite() && spec.velocity[1].is_finite()) {
            log::warn!("Asteroid at ({}, {}) has an invalid velocity", spec.x, spec.y);
            spec.velocity = [0.0, 0.0];
        }
        spec
    });
    factory.set(["asteroid", "rock"], move |spec: AsteroidSpec| {
        let entity = Entity::new();

        let mut body = Body::at(spec.x, spec.y, BASE_RADIUS * spec.size.scale_factor());
        body.velocity = Vector2::from(spec.velocity);
        let component = Component::new();
        component.decorate(Rc::new(RefCell::new(body)));
        entity.set_component("body", component);

        let data = json!({
            "size": spec.size.name(),
            "points": spec.size.points(),
            "splits_into": spec.size.split_into().map(AsteroidSize::name),
        });
        if let Some(component) = components.create("asteroid", data) {
            entity.set_component("asteroid", component);
        }
        entity
    });
    factory
}

/// Typed body of an entity, if it has one
pub fn body_of(entity: &Entity) -> Option<Rc<RefCell<Body>>> {
    entity.get_component("body")?.record::<Body>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_asteroid_sizes() {
        assert_eq!(AsteroidSize::Large.split_into(), Some(AsteroidSize::Medium));
        assert_eq!(AsteroidSize::Small.split_into(), None);
        assert!(AsteroidSize::Small.points() > AsteroidSize::Large.points());
    }

    #[test]
    fn test_body_record_keys() {
        let mut body = Body::at(1.0, 2.0, 3.0);
        body.velocity = Vector2::new(3.0, 4.0);
        assert_eq!(Record::get(&body, "speed"), Some(json!(5.0)));
        assert!(!Record::set(&mut body, "speed", json!(1.0)));
        assert!(Record::set(&mut body, "dx", json!(0.0)));
        assert_relative_eq!(body.velocity.x, 0.0);
    }

    #[test]
    fn test_body_motion_and_wrap() {
        let mut body = Body::at(790.0, 10.0, 1.0);
        body.velocity = Vector2::new(20.0, -40.0);
        body.advance(0.5);
        body.wrap(800.0, 600.0);
        assert_relative_eq!(body.position.x, 0.0);
        assert_relative_eq!(body.position.y, 590.0);

        body.wrap(0.0, f64::NAN);
        assert_relative_eq!(body.position.x, 0.0);
        assert_relative_eq!(body.position.y, 590.0);
    }

    #[test]
    fn test_factory_decorates_body() {
        let spec = AsteroidSpec {
            x: 5.0,
            y: 6.0,
            size: AsteroidSize::Medium,
            velocity: [1.0, 0.0],
        };
        let entity = entity_factory().create("rock", spec).unwrap();
        let component = entity.get_component("body").unwrap();
        assert_eq!(component.get("x"), Some(json!(5.0)));

        component.set("x", json!(7.5));
        let body = body_of(&entity).unwrap();
        assert_relative_eq!(body.borrow().position.x, 7.5);
        assert_relative_eq!(body.borrow().radius, 18.0);
        let data = entity.get_component("asteroid").unwrap();
        assert_eq!(data.get("size"), Some(json!("medium")));
        assert_eq!(data.get("splits_into"), Some(json!("small")));
        assert_eq!(data.get("tag"), Some(json!("asteroid")));
    }

    #[test]
    fn test_factory_resets_invalid_velocity() {
        let spec = AsteroidSpec {
            x: 0.0,
            y: 0.0,
            size: AsteroidSize::Large,
            velocity: [f64::NAN, 1.0],
        };
        let body = body_of(&entity_factory().create("asteroid", spec).unwrap()).unwrap();
        assert_relative_eq!(body.borrow().velocity.norm(), 0.0);
        assert!(entity_factory().create("ship", spec_at_origin()).is_none());
    }

    fn spec_at_origin() -> AsteroidSpec {
        AsteroidSpec {
            x: 0.0,
            y: 0.0,
            size: AsteroidSize::Small,
            velocity: [0.0, 0.0],
        }
    }
}
