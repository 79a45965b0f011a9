fn main() {
    sonometer_lib::run()
}
