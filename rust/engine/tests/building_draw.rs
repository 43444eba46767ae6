// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end draw passes over a scene.

use approx::assert_relative_eq;
use townrow_engine::{
    draw, AlignAnchor, Building, NoProgress, Part, PartKind, RebuildKind, SolidOp, SpreadCount,
    SpreadRounding, Template, TemplateCatalog,
};
use townrow_kernel::{NodeKey, Point3, Scene, Solid};

fn prototype() -> Solid {
    // 1 wide, 4 deep, 3 tall cross-section
    Solid::box_solid(Point3::origin(), Point3::new(1.0, 4.0, 3.0))
}

/// Quad stamped into the front facade (facade outward normal is −Y).
fn front_stamp(x0: f64, x1: f64, z0: f64, z1: f64) -> Solid {
    let mut body = Solid::new();
    body.add_face(&[
        Point3::new(x0, 0.0, z0),
        Point3::new(x0, 0.0, z1),
        Point3::new(x1, 0.0, z1),
        Point3::new(x1, 0.0, z0),
    ])
    .unwrap();
    body
}

fn straight_path() -> Vec<Point3<f64>> {
    vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)]
}

fn volume_instance(scene: &Scene, root: NodeKey) -> NodeKey {
    scene
        .descendants(root)
        .into_iter()
        .find(|&k| {
            scene
                .node(k)
                .is_some_and(|n| n.is_instance() && scene.source_part(k).is_none())
        })
        .unwrap()
}

fn instances_of<'a>(scene: &'a Scene, root: NodeKey, part: &str) -> Vec<NodeKey> {
    scene
        .descendants(root)
        .into_iter()
        .filter(|&k| scene.source_part(k) == Some(part))
        .collect()
}

#[test]
fn straight_path_spans_one_segment() {
    let mut catalog = TemplateCatalog::new();
    catalog.insert(Template::new("row", prototype()).with_depth(4.0));
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());

    let report = draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    assert_eq!(report.kind, RebuildKind::Full);
    assert_eq!(report.segments, 1);

    let root = building.output().unwrap();
    let volume = volume_instance(&scene, root);
    let solid = scene.solid(scene.instance_solid(volume).unwrap()).unwrap();

    // The prototype was sheared to span the full path length
    let (min, max) = solid.bounds();
    assert_relative_eq!(min.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(max.x, 10.0, epsilon = 1e-9);
    assert_relative_eq!(max.y, 4.0, epsilon = 1e-9);
    assert_relative_eq!(max.z, 3.0, epsilon = 1e-9);
}

#[test]
fn identical_redraw_leaves_geometry_alone() {
    let mut catalog = TemplateCatalog::new();
    catalog.insert(Template::new("row", prototype()).with_depth(4.0));
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());

    draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    let root = building.output().unwrap();
    let volume = volume_instance(&scene, root);
    let nodes = scene.node_count();

    let report = draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    assert_eq!(report.kind, RebuildKind::MaterialsOnly);
    assert_eq!(building.output(), Some(root));
    assert!(scene.node(volume).is_some());
    assert_eq!(scene.node_count(), nodes);
}

#[test]
fn boolean_parts_run_in_declared_order() {
    let tool = Solid::box_solid(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
    let mut catalog = TemplateCatalog::new();
    catalog.insert(
        Template::new("row", prototype())
            .with_depth(4.0)
            .with_part(
                Part::new("late", PartKind::None)
                    .with_body(tool.clone())
                    .with_solid_tag(SolidOp::Subtract, 2),
            )
            .with_part(
                Part::new("first", PartKind::None)
                    .with_body(tool.clone())
                    .with_solid_tag(SolidOp::Subtract, 0),
            )
            .with_part(
                Part::new("middle", PartKind::None)
                    .with_body(tool)
                    .with_solid_tag(SolidOp::Subtract, 1),
            ),
    );
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());
    building.solids_enabled = true;

    let report = draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    let indices: Vec<i32> = report.solids.applied.iter().map(|(_, _, i)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    // Boolean parts were consumed; no instances of them remain
    let root = building.output().unwrap();
    assert!(instances_of(&scene, root, "first").is_empty());
    assert!(instances_of(&scene, root, "late").is_empty());
}

#[test]
fn interval_spread_respects_forced_odd_count() {
    let mut catalog = TemplateCatalog::new();
    catalog.insert(
        Template::new("row", prototype()).with_depth(4.0).with_part(
            Part::new(
                "window",
                PartKind::Spread {
                    count: SpreadCount::Interval {
                        interval: 3.0,
                        rounding: SpreadRounding::ForceOdd,
                    },
                    margin_left: 0.5,
                    margin_right: 0.5,
                    allow_overflow: false,
                },
            )
            .with_body(Solid::box_solid(
                Point3::new(-0.4, -0.1, 1.0),
                Point3::new(0.4, 0.0, 2.0),
            )),
        ),
    );
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());

    draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();

    // Usable span 9 at interval 3 rounds to 3, already odd
    let root = building.output().unwrap();
    let windows = instances_of(&scene, root, "window");
    assert_eq!(windows.len(), 3);

    // Evenly spaced across the margined span
    let mut xs: Vec<f64> = windows
        .iter()
        .map(|&k| scene.instance_transform(k).unwrap()[(0, 3)])
        .collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_relative_eq!(xs[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(xs[1], 5.0, epsilon = 1e-9);
    assert_relative_eq!(xs[2], 8.0, epsilon = 1e-9);
}

#[test]
fn opening_cut_hides_the_facade_interior() {
    let mut catalog = TemplateCatalog::new();
    catalog.insert(
        Template::new("row", prototype()).with_depth(4.0).with_part(
            Part::new("doorway", PartKind::Align(AlignAnchor::Center))
                .with_body(front_stamp(-2.0, 2.0, 0.5, 2.5))
                .with_solid_tag(SolidOp::CutFaces, 0),
        ),
    );
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());
    building.solids_enabled = true;

    let report = draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    assert_eq!(report.solids.cut_loops, 1);
    assert_eq!(report.solids.hidden_faces, 1);

    // The interior disc is in the mesh but hidden; the facade stays visible
    let root = building.output().unwrap();
    let volume = volume_instance(&scene, root);
    let solid = scene.solid(scene.instance_solid(volume).unwrap()).unwrap();
    assert!(solid.visible_face_count() < solid.face_count());
}

#[test]
fn material_substitution_round_trip() {
    let mut catalog = TemplateCatalog::new();
    catalog.insert(
        Template::new("row", prototype()).with_depth(4.0).with_part(
            Part::new("trim", PartKind::Align(AlignAnchor::Left))
                .with_body(Solid::box_solid(
                    Point3::new(0.0, -0.2, 0.0),
                    Point3::new(0.5, 0.0, 3.0),
                ))
                .with_material("brick"),
        ),
    );
    let mut scene = Scene::new();
    let mut building = Building::new("row", straight_path());
    draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();

    let root = building.output().unwrap();
    let trim = instances_of(&scene, root, "trim")[0];
    assert_eq!(scene.material(trim), Some("brick"));

    building.set_material_substitution("brick", Some("plaster"));
    let report = draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    assert_eq!(report.kind, RebuildKind::MaterialsOnly);
    assert_eq!(scene.material(trim), Some("plaster"));

    building.set_material_substitution("brick", None);
    draw(&mut scene, &catalog, &mut building, &mut NoProgress).unwrap();
    assert_eq!(scene.material(trim), Some("brick"));
}
