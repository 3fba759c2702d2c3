mod competing;
mod fuzz;
mod roundtrip;
