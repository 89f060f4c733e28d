fn main() {
    panmat::main();
}
