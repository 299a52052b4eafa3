//! Shared builders for the integration tests.

#![allow(dead_code)]

use dynx_solver::{
    ElementKind, HardeningLaw, JohnsonCookParameters, Material, Mesh, Model, Selection,
};

/// Structured `nx × ny` grid of quadrilaterals with origin `(x0, 0)`.
///
/// Node ids run row by row from 1. Predefined sets: element set `all`,
/// node sets `nodes`, `left`, `right`, `bottom`, `top`.
pub fn grid(nx: i32, ny: i32, dx: f64, dy: f64, kind: ElementKind, x0: f64) -> Model {
    let mut mesh = Mesh::new();
    let row = nx + 1;
    for j in 0..=ny {
        for i in 0..=nx {
            mesh.create_node(j * row + i + 1, x0 + i as f64 * dx, j as f64 * dy, 0.0).unwrap();
        }
    }
    for j in 0..ny {
        for i in 0..nx {
            let a = j * row + i + 1;
            mesh.create_element(j * nx + i + 1, kind, [a, a + 1, a + row + 1, a + row]).unwrap();
        }
    }

    let mut model = Model::new(mesh);
    model.sets.add_all_elements(&model.mesh, "all");
    model.sets.add_all_nodes(&model.mesh, "nodes");
    let last = (ny + 1) * row;
    let left = Selection::Strided { start: 1, end: last, stride: row };
    model.add_nodes("left", left).unwrap();
    let right = Selection::Strided { start: row, end: last, stride: row };
    model.add_nodes("right", right).unwrap();
    model.add_nodes("bottom", 1..=row).unwrap();
    model.add_nodes("top", (ny * row + 1)..=last).unwrap();
    model
}

pub fn elastic_steel() -> Material {
    Material::new("steel", 206000.0, 0.3, 7.83e-9)
}

/// Perfectly plastic steel with a 300 MPa flow stress
pub fn perfectly_plastic_steel() -> Material {
    elastic_steel().with_hardening(HardeningLaw::PowerLaw {
        a: 300.0,
        b: 0.0,
        n: 1.0,
    })
}

/// 42CrMo4 Johnson–Cook parameters (MPa, mm, s, °C)
pub fn johnson_cook_steel() -> Material {
    Material::new("42CrMo4", 206000.0, 0.3, 7.83e-9)
        .with_thermal(4.6e8, 0.9, 20.0)
        .with_hardening(HardeningLaw::JohnsonCook(JohnsonCookParameters {
            a: 806.0,
            b: 614.0,
            c: 0.0089,
            n: 0.168,
            m: 1.1,
            reference_strain_rate: 1.0,
            melting_temperature: 1540.0,
            reference_temperature: 20.0,
        }))
}
