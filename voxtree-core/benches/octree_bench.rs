use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{thread_rng, Rng};
use voxtree_core::{
    containers::VecPointCloud,
    nalgebra::Vector3,
    octree::{OctreePointCloudSearch, OctreePointCloudVoxelCentroid},
};

fn gen_random_cloud(count: usize) -> VecPointCloud {
    let mut rng = thread_rng();
    (0..count)
        .map(|_| {
            Vector3::new(
                rng.gen::<f64>() * 20.0,
                rng.gen::<f64>() * 20.0,
                rng.gen::<f64>() * 5.0,
            )
        })
        .collect()
}

fn build_search_octree(cloud: &VecPointCloud) {
    let mut octree = OctreePointCloudSearch::new(0.1).unwrap();
    octree.set_input_cloud(cloud);
    octree.add_points_from_input_cloud().unwrap();
    black_box(octree);
}

fn build_centroid_octree(cloud: &VecPointCloud) {
    let mut octree = OctreePointCloudVoxelCentroid::new(0.1).unwrap();
    octree.set_input_cloud(cloud);
    octree.add_points_from_input_cloud().unwrap();
    black_box(octree);
}

fn bench(c: &mut Criterion) {
    let cloud = gen_random_cloud(100_000);

    c.bench_function("octree_insert_indices", |b| {
        b.iter(|| build_search_octree(&cloud));
    });
    c.bench_function("octree_insert_centroids", |b| {
        b.iter(|| build_centroid_octree(&cloud));
    });

    let mut octree = OctreePointCloudSearch::new(0.1).unwrap();
    octree.set_input_cloud(&cloud);
    octree.add_points_from_input_cloud().unwrap();
    let query = Vector3::new(10.0, 10.0, 2.5);
    c.bench_function("octree_nearest_k_16", |b| {
        b.iter(|| black_box(octree.nearest_k_search(&query, 16)));
    });
    c.bench_function("octree_radius_0_5", |b| {
        b.iter(|| black_box(octree.radius_search(&query, 0.5, None)));
    });
}

criterion_group! {
    name = octree;
    config = Criterion::default().sample_size(20);
    targets = bench
}
criterion_main!(octree);
