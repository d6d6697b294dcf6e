fn main() {
    lampviz::app::run();
}
